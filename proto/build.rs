fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Compile all modular proto files
    tonic_build::configure()
        .build_server(true)
        .build_client(true)
        .compile_protos(
            &[
                "common.proto",
                "session.proto",
                "coach.proto",
                "multiplayer.proto",
                "analytics.proto",
                "session_service.proto",
            ],
            &["."],
        )?;
    Ok(())
}
