fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Server stubs back the in-process services used by the tests
    tonic_build::configure()
        .build_server(true)
        .build_client(true)
        .compile_protos(&["proto/config.proto", "proto/task.proto"], &["proto"])?;

    println!("cargo:rerun-if-changed=proto/config.proto");
    println!("cargo:rerun-if-changed=proto/task.proto");

    Ok(())
}
