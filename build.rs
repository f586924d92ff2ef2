use std::env;
use std::process::Command;

// First stable release with the AVX-512F intrinsics and target feature.
const AVX512_STABLE_MINOR: u32 = 89;

#[derive(Debug, PartialEq, Eq)]
struct RustcVersion {
    major: u32,
    minor: u32,
    nightly: bool,
}

impl RustcVersion {
    // Parses the first line of `rustc --version`, e.g. "rustc 1.89.0 (29483883e 2025-08-04)".
    fn parse(version_info: &str) -> Option<RustcVersion> {
        let version = version_info.split_whitespace().nth(1)?;
        let mut parts = version.split(['.', '-']);
        let major = parts.next()?.parse().ok()?;
        let minor = parts.next()?.parse().ok()?;
        Some(RustcVersion {
            major,
            minor,
            nightly: version_info.contains("nightly"),
        })
    }

    fn has_stable_avx512(&self) -> bool {
        self.major > 1 || (self.major == 1 && self.minor >= AVX512_STABLE_MINOR)
    }
}

fn rustc_version() -> Option<RustcVersion> {
    let rustc = env::var("RUSTC").unwrap_or_else(|_| "rustc".to_string());
    let output = Command::new(rustc).arg("--version").output().ok()?;
    RustcVersion::parse(&String::from_utf8_lossy(&output.stdout))
}

fn main() {
    println!("cargo::rustc-check-cfg=cfg(avx512)");
    println!("cargo:rerun-if-env-changed=RUSTC");

    let target_arch = env::var("CARGO_CFG_TARGET_ARCH").unwrap_or_default();
    let version = rustc_version();

    // Backends are picked at runtime; this only decides whether the AVX-512
    // backend can be compiled at all.
    let avx512 = target_arch == "x86_64" && version.as_ref().is_some_and(|v| v.has_stable_avx512());

    if avx512 {
        println!("cargo:rustc-cfg=avx512");
    }

    if let Some(v) = version {
        println!(
            "applying: rustc {}.{}{}, avx512 backend {}",
            v.major,
            v.minor,
            if v.nightly { " (nightly)" } else { "" },
            if avx512 { "enabled" } else { "disabled" }
        );
    }
}
