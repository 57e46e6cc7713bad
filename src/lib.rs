pub mod commit;
pub mod config;
pub mod coordinator;
pub mod endorsement;
pub mod error;
pub mod grpc;
pub mod identity;
pub mod network;
pub mod signer;
pub mod store;
pub mod transaction;
pub mod transport;
#[allow(dead_code)]
mod protos;
