//! Transport implementations speaking the Fabric gRPC services through the
//! generated tonic clients.

pub(crate) mod deliver;
pub(crate) mod endorser;
pub(crate) mod orderer;

pub use deliver::GrpcEventHub;
pub use endorser::GrpcEndorser;
pub use orderer::GrpcOrderer;
