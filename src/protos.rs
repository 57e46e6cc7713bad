//! Fabric messages and gRPC clients generated from `fabric-protos/`.

pub(crate) mod common {
    tonic::include_proto!("common");
}

pub(crate) mod msp {
    tonic::include_proto!("msp");
}

pub(crate) mod orderer {
    tonic::include_proto!("orderer");
}

/// The peer package is named `protos` on the wire.
pub(crate) mod peer {
    tonic::include_proto!("protos");
}
