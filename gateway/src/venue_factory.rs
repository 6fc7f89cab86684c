//! Maps one account's `exchange` string + endpoint table + credentials into
//! a concrete `Arc<dyn VenueClient>`, and the matching WebSocket base URL
//! each running stream needs. The four arms mirror `VenueTag::from_str`'s
//! alias table (`gateway_domain::venue`) so a config file can name a venue
//! either way.

use std::sync::Arc;

use anyhow::{bail, Context, Result};
use gateway_core::venues::reference::{ReferenceVenue, ReferenceVenueConfig};
use gateway_core::venues::venue_b::{VenueB, VenueBConfig};
use gateway_core::venues::venue_c::{VenueC, VenueCConfig};
use gateway_core::venues::venue_d::{VenueD, VenueDConfig};
use gateway_core::VenueClient;
use gateway_domain::VenueTag;

use crate::config::{AccountConfig, EndpointConfig};

/// Venue D alone carries a passphrase; the config file's `sub_account_name`
/// slot doubles as that field since no other venue needs a third secret.
pub fn build_venue_client(
    account: &AccountConfig,
    endpoint: &EndpointConfig,
) -> Result<(Arc<dyn VenueClient>, String)> {
    let venue_tag: VenueTag = account
        .exchange
        .parse()
        .with_context(|| format!("unrecognized exchange {:?} for account {}", account.exchange, account.name))?;
    let (rest_host, ws_host) = endpoint.rest_and_ws(account.test_net);
    let rest_host = rest_host.to_string();
    let ws_host = ws_host.to_string();
    let api_secret = account.api_secret.as_bytes().to_vec();

    let client: Arc<dyn VenueClient> = match venue_tag {
        VenueTag::Reference => Arc::new(ReferenceVenue::new(ReferenceVenueConfig {
            rest_host,
            api_key: account.api_key.clone(),
            api_secret,
        })),
        VenueTag::VenueB => Arc::new(VenueB::new(VenueBConfig {
            rest_host,
            api_key: account.api_key.clone(),
            api_secret,
        })),
        VenueTag::VenueC => Arc::new(VenueC::new(VenueCConfig {
            rest_host,
            api_key: account.api_key.clone(),
            api_secret,
        })),
        VenueTag::VenueD => {
            let Some(passphrase) = account.sub_account_name.clone() else {
                bail!("account {} selects venue_d but carries no passphrase (sub_account_name)", account.name);
            };
            Arc::new(VenueD::new(VenueDConfig {
                rest_host,
                api_key: account.api_key.clone(),
                api_secret,
                passphrase,
            }))
        }
    };

    Ok((client, ws_host))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn endpoint() -> EndpointConfig {
        EndpointConfig {
            api_public: "https://api.example".into(),
            ws_public: "wss://ws.example".into(),
            api_auth: "https://api.example".into(),
            ws_auth: "wss://ws.example".into(),
            api_test: "https://test.example".into(),
            ws_test: "wss://wstest.example".into(),
            ws_public_mbr: None,
        }
    }

    #[test]
    fn unrecognized_exchange_name_is_an_error() {
        let account = AccountConfig {
            name: "acct".into(),
            exchange: "not-a-venue".into(),
            sub_account_name: None,
            test_net: false,
            api_key: "k".into(),
            api_secret: "s".into(),
        };
        assert!(build_venue_client(&account, &endpoint()).is_err());
    }

    #[test]
    fn venue_d_without_passphrase_is_an_error() {
        let account = AccountConfig {
            name: "acct".into(),
            exchange: "venue_d".into(),
            sub_account_name: None,
            test_net: false,
            api_key: "k".into(),
            api_secret: "s".into(),
        };
        assert!(build_venue_client(&account, &endpoint()).is_err());
    }

    #[test]
    fn reference_account_builds_successfully() {
        let account = AccountConfig {
            name: "acct".into(),
            exchange: "reference".into(),
            sub_account_name: None,
            test_net: true,
            api_key: "k".into(),
            api_secret: "s".into(),
        };
        let (_client, ws_host) = build_venue_client(&account, &endpoint()).unwrap();
        assert_eq!(ws_host, "wss://wstest.example");
    }
}
