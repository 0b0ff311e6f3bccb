// 构建脚本: 静态链接FFmpeg时补充Windows系统库
fn main() {
    println!("cargo:rerun-if-changed=build.rs");

    // 仅在 ffmpeg-static 特性 + Windows MSVC 目标下需要
    if std::env::var_os("CARGO_FEATURE_FFMPEG_STATIC").is_none() {
        return;
    }
    let target_os = std::env::var("CARGO_CFG_TARGET_OS").unwrap_or_default();
    let target_env = std::env::var("CARGO_CFG_TARGET_ENV").unwrap_or_default();
    if target_os != "windows" || target_env != "msvc" {
        return;
    }

    // Intel QSV (Quick Sync Video) 硬件加速
    println!("cargo:rustc-link-lib=dylib=libmfx");

    // OLE 自动化和VFW
    println!("cargo:rustc-link-lib=dylib=oleaut32");
    println!("cargo:rustc-link-lib=dylib=vfw32");

    // Secure Channel (TLS/SSL, rtsps)
    println!("cargo:rustc-link-lib=dylib=secur32");
}
