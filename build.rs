#[cfg(target_os = "windows")]
use std::path::{Path, PathBuf};

/// Default location of a local FFmpeg drop, relative to the package root
#[cfg(target_os = "windows")]
const DEFAULT_FFMPEG_BIN: &str = "third_party/ffmpeg/bin";

/// Libraries ac-ffmpeg links against. swresample is not used by the decoders here,
/// but ac-ffmpeg's native glue references it, so it has to load as well.
#[cfg(target_os = "windows")]
const LINKED_LIBRARIES: &[&str] = &["avcodec", "avformat", "avutil", "swresample", "swscale"];

fn main() {
    // Windows builds resolve the FFmpeg DLLs next to the binary.
    #[cfg(target_os = "windows")]
    {
        println!("cargo:rerun-if-env-changed=FFMPEG_BIN_DIR");

        let ffmpeg_bin = std::env::var_os("FFMPEG_BIN_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_FFMPEG_BIN));
        println!("cargo:rerun-if-changed={}", ffmpeg_bin.display());

        if !ffmpeg_bin.exists() {
            println!(
                "cargo:warning=FFmpeg DLLs not found at {} (set FFMPEG_BIN_DIR)",
                ffmpeg_bin.display()
            );
            return;
        }

        let out_dir = PathBuf::from(std::env::var("OUT_DIR").expect("OUT_DIR is set by cargo"));
        // OUT_DIR is target/<profile>/build/<crate>/out
        let target_dir = out_dir
            .ancestors()
            .nth(3)
            .expect("Cannot resolve target dir");

        let mut missing: Vec<&str> = LINKED_LIBRARIES.to_vec();
        for entry in std::fs::read_dir(&ffmpeg_bin).expect("Cannot read ffmpeg bin dir") {
            let path = entry.expect("Cannot read ffmpeg bin entry").path();
            let Some(library) = linked_library(&path) else {
                continue;
            };
            missing.retain(|name| *name != library);

            let Some(file_name) = path.file_name() else {
                continue;
            };
            let dest = target_dir.join(file_name);
            if !dest.exists() || file_modified(&path) > file_modified(&dest) {
                std::fs::copy(&path, &dest)
                    .unwrap_or_else(|e| panic!("Failed to copy {:?} to {:?}: {}", path, dest, e));
                println!("cargo:warning=Copied {} to output dir", path.display());
            }
        }

        for library in missing {
            println!(
                "cargo:warning=no {} DLL in {}",
                library,
                ffmpeg_bin.display()
            );
        }
        println!("cargo:rustc-link-search=native={}", ffmpeg_bin.display());
    }
}

#[cfg(target_os = "windows")]
fn file_modified(path: &Path) -> std::time::SystemTime {
    std::fs::metadata(path)
        .and_then(|m| m.modified())
        .unwrap_or(std::time::SystemTime::UNIX_EPOCH)
}

/// Which linked library a DLL such as `avcodec-61.dll` belongs to.
#[cfg(target_os = "windows")]
fn linked_library(path: &Path) -> Option<&'static str> {
    let lower = path.file_name()?.to_str()?.to_ascii_lowercase();
    let stem = lower.strip_suffix(".dll")?;
    LINKED_LIBRARIES
        .iter()
        .copied()
        .find(|library| stem.strip_prefix(library).is_some_and(|rest| rest.starts_with('-')))
}
