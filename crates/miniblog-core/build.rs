/// Builds the gRPC client and server code for `miniblog/v1/miniblog.proto`
/// using `tonic-prost-build`.
///
/// The `protoc` binary comes from `protoc-bin-vendored`, so no system protobuf
/// compiler is required.
///
/// # JSON representation
///
/// Every generated message also derives `serde::Serialize` and
/// `serde::Deserialize` with camelCase field names and `#[serde(default)]`.
/// The HTTP front-ends (gateway and plain HTTP) bind request bodies and render
/// responses straight from these types. Enum fields are rendered by name
/// (`"Healthy"`), matching the protobuf JSON mapping.
///
/// # Output
///
/// - Rust bindings, included via `tonic::include_proto!("miniblog.v1")`.
/// - `miniblog_descriptor.bin`, the encoded file descriptor set used by the
///   reflection service.
use std::env;
use std::path::PathBuf;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("cargo:rerun-if-changed=proto/");

    let out_dir = PathBuf::from(env::var("OUT_DIR")?);
    let descriptor_path = out_dir.join("miniblog_descriptor.bin");

    let mut config = tonic_prost_build::Config::new();
    config
        .protoc_executable(protoc_bin_vendored::protoc_bin_path()?)
        .file_descriptor_set_path(&descriptor_path);

    tonic_prost_build::configure()
        .type_attribute(
            ".miniblog.v1",
            "#[derive(serde::Serialize, serde::Deserialize)]",
        )
        .message_attribute(
            ".miniblog.v1",
            "#[serde(default, rename_all = \"camelCase\")]",
        )
        .field_attribute(
            ".miniblog.v1.HealthzResponse.status",
            "#[serde(with = \"crate::json::service_status\")]",
        )
        .compile_with_config(config, &["proto/miniblog/v1/miniblog.proto"], &["proto"])?;

    Ok(())
}
