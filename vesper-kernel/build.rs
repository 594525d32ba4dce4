fn main() {
    println!("cargo:rustc-check-cfg=cfg(vesper_bare_metal)");

    let arch = std::env::var("CARGO_CFG_TARGET_ARCH").unwrap_or_default();
    let os = std::env::var("CARGO_CFG_TARGET_OS").unwrap_or_default();
    if arch != "aarch64" || os != "none" {
        // Host build: only the stub `main` is compiled
        return;
    }
    println!("cargo:rustc-cfg=vesper_bare_metal");

    let script = if std::env::var_os("CARGO_FEATURE_RPI4").is_some() {
        "rpi4.ld"
    } else {
        "qemu-virt.ld"
    };

    // Tell cargo to pass the linker script to the linker
    let manifest_dir = std::env::var("CARGO_MANIFEST_DIR").unwrap();
    println!("cargo:rustc-link-arg-bins=-T{}/{}", manifest_dir, script);

    // Rerun if linker scripts change
    println!("cargo:rerun-if-changed=qemu-virt.ld");
    println!("cargo:rerun-if-changed=rpi4.ld");
}
