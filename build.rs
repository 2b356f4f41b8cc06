fn main() -> Result<(), Box<dyn std::error::Error>> {
    tonic_build::configure()
        .build_server(true)
        .build_client(true)
        .type_attribute(
            ".pcbook",
            "#[derive(serde::Serialize, serde::Deserialize)]",
        )
        .compile(&["proto/laptop_service.proto"], &["proto"])?;

    println!("cargo:rerun-if-changed=proto/laptop_service.proto");
    Ok(())
}
