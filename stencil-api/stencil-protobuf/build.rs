fn main() -> Result<(), Box<dyn std::error::Error>> {
    let include_paths: &[_] = &["proto/"];

    if !std::path::Path::new(include_paths[0]).exists() {
        return Err(format!("Proto directory does not exist at {}", include_paths[0]).into());
    }

    let proto_files: &[_] = &["proto/stencil/v1/workflow_template.proto"];

    for proto_file in proto_files {
        if !std::path::Path::new(proto_file).exists() {
            return Err(format!("Proto file does not exist at {}", proto_file).into());
        }
        println!("cargo:rerun-if-changed={proto_file}");
    }

    tonic_build::configure()
        .build_client(true)
        .build_server(true)
        .generate_default_stubs(true)
        .compile_protos(proto_files, include_paths)?;

    Ok(())
}
