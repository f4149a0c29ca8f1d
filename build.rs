fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Compile authority proto (server for the service, client for tests and callers)
    tonic_build::configure()
        .build_server(true)
        .build_client(true)
        .compile_protos(&["proto/auth.proto"], &["proto"])?;

    Ok(())
}
