use std::path::PathBuf;

use clap::{Parser, Subcommand};

const VERSION: &str = concat!(
    env!("CARGO_PKG_VERSION"),
    " (",
    env!("GIT_SHA"),
    ", ",
    env!("BUILD_DATE"),
    ", ",
    env!("CODEC_BACKEND"),
    ")"
);

#[derive(Parser, Debug)]
#[command(name = "opus-async", version = VERSION)]
pub struct Args {
    #[command(subcommand)]
    pub cmd: Command,

    /// Settings file (TOML) with `[runtime]` and `[encoder]` tables
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Worker threads running codec jobs (overrides the settings file)
    #[arg(long)]
    pub workers: Option<usize>,

    /// Maximum queued jobs before submissions are rejected
    #[arg(long)]
    pub queue_capacity: Option<usize>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Encode an audio file into an Opus packet stream
    Encode {
        /// Input audio file (any format Symphonia can probe)
        input: PathBuf,

        /// Output packet stream
        output: PathBuf,

        /// Target bitrate in bits per second; 0 or negative means maximum
        #[arg(long, allow_negative_numbers = true)]
        bitrate: Option<i32>,

        /// Tune the encoder for speech
        #[arg(long)]
        voice: bool,

        /// Frame duration in milliseconds (10, 20, 40 or 60)
        #[arg(long)]
        frame_ms: Option<u32>,
    },

    /// Decode an Opus packet stream into raw interleaved s16le PCM
    Decode {
        /// Input packet stream written by `encode`
        input: PathBuf,

        /// Output raw PCM file
        output: PathBuf,

        /// Rebuild lost packets (zero-length entries) from the next packet's FEC data
        #[arg(long)]
        fec: bool,
    },
}
