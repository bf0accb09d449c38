//! Thin CLI front-end: `zstdcore compress <in> <out> [--level N]` and
//! `zstdcore decompress <in> <out>`. Reads the whole input file into memory,
//! calls the library, writes the whole result back out.
//!
//! No flag-parsing crate: the surface is two subcommands and one optional
//! integer flag, which a handful of `match`es cover without pulling in a
//! dependency for it.

use std::fs;
use std::process::ExitCode;

use zstdcore::{DEFAULT_COMPRESSION_LEVEL, MAX_COMPRESSION_LEVEL, MIN_COMPRESSION_LEVEL};

fn usage() -> String {
    "usage:\n  zstdcore compress <input> <output> [--level N]\n  zstdcore decompress <input> <output>".to_string()
}

fn run() -> Result<(), String> {
    env_logger::init();
    let mut args = std::env::args().skip(1);
    let command = args.next().ok_or_else(usage)?;

    match command.as_str() {
        "compress" => {
            let input_path = args.next().ok_or_else(usage)?;
            let output_path = args.next().ok_or_else(usage)?;
            let mut level = DEFAULT_COMPRESSION_LEVEL;
            while let Some(flag) = args.next() {
                match flag.as_str() {
                    "--level" => {
                        let value = args.next().ok_or_else(usage)?;
                        level = value.parse::<i32>().map_err(|e| format!("invalid --level value: {e}"))?;
                    }
                    other => return Err(format!("unrecognized flag {other}\n{}", usage())),
                }
            }
            if !(MIN_COMPRESSION_LEVEL..=MAX_COMPRESSION_LEVEL).contains(&level) {
                return Err(format!(
                    "--level {level} is out of range [{MIN_COMPRESSION_LEVEL}, {MAX_COMPRESSION_LEVEL}]"
                ));
            }

            let input = fs::read(&input_path).map_err(|e| format!("reading {input_path}: {e}"))?;
            let compressed = zstdcore::compress_to_vec(&input, level);
            log::info!("{} -> {} bytes (level {level})", input.len(), compressed.len());
            fs::write(&output_path, compressed).map_err(|e| format!("writing {output_path}: {e}"))?;
        }
        "decompress" => {
            let input_path = args.next().ok_or_else(usage)?;
            let output_path = args.next().ok_or_else(usage)?;

            let input = fs::read(&input_path).map_err(|e| format!("reading {input_path}: {e}"))?;
            let decompressed = zstdcore::decompress_to_vec(&input).map_err(|e| e.to_string())?;
            log::info!("{} -> {} bytes", input.len(), decompressed.len());
            fs::write(&output_path, decompressed).map_err(|e| format!("writing {output_path}: {e}"))?;
        }
        other => return Err(format!("unrecognized command {other}\n{}", usage())),
    }

    Ok(())
}

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(msg) => {
            eprintln!("zstdcore: {msg}");
            ExitCode::FAILURE
        }
    }
}
