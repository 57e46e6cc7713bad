fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("cargo:rerun-if-changed=fabric-protos");
    tonic_build::configure()
        .build_client(true)
        .build_server(false)
        .compile_protos(
            &[
                "fabric-protos/common/common.proto",
                "fabric-protos/msp/identities.proto",
                "fabric-protos/peer/peer.proto",
                "fabric-protos/peer/transaction.proto",
                "fabric-protos/peer/events.proto",
                "fabric-protos/orderer/ab.proto",
            ],
            &["fabric-protos"],
        )?;
    Ok(())
}
