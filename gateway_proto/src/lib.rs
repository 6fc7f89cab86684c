//! Generated `Martin` gRPC service types and server/client stubs (§6). The
//! RPC IDL itself is treated as a pre-defined external interface; this crate
//! is the concrete realization `martin.proto` compiles into.

tonic::include_proto!("martin");
