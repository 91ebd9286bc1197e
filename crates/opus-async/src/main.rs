//! opus-async: encode audio files into Opus packet streams and back, with every
//! codec call running as a job on the worker pool.
//!
//! ## Modes
//! - `encode`: decode any Symphonia-readable file to PCM, split it into fixed
//!   frames, and write one Opus packet per frame.
//! - `decode`: read a packet stream and write raw interleaved s16le PCM,
//!   optionally rebuilding lost packets from FEC data.

mod cli;
mod input;

use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

use anyhow::{Context, Result};
use clap::Parser;
use job_runtime::Runtime;
use opus_async::container::{self, StreamHeader};
use opus_async::libopus::LibOpus;
use opus_async::settings::{self, Settings};
use opus_async::{pcm, stream};
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    let args = cli::Args::parse();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new("info,opus_async=info")
        }))
        .init();

    let mut settings = Settings::load(args.config.as_deref())?;
    if let Some(workers) = args.workers {
        settings.runtime.workers = workers;
    }
    if let Some(capacity) = args.queue_capacity {
        settings.runtime.queue_capacity = Some(capacity);
    }
    settings.validate()?;

    let rt = Runtime::new(&settings.runtime)?;
    tracing::info!(
        workers = rt.handle().pool().size(),
        backend = opus_async::CODEC_BACKEND,
        "runtime ready"
    );

    match args.cmd {
        cli::Command::Encode {
            input,
            output,
            bitrate,
            voice,
            frame_ms,
        } => {
            let mut encoder = settings.encoder.clone();
            if let Some(bitrate) = bitrate {
                encoder.bitrate = bitrate;
            }
            encoder.voice |= voice;
            if let Some(frame_ms) = frame_ms {
                settings::validate_frame_ms(frame_ms)?;
                encoder.frame_ms = frame_ms;
            }
            encode_file(&rt, &input, &output, &encoder)?;
        }
        cli::Command::Decode { input, output, fec } => {
            decode_file(&rt, &input, &output, fec)?;
        }
    }

    Ok(())
}

fn encode_file(
    rt: &Runtime,
    input: &Path,
    output: &Path,
    opts: &settings::EncoderSettings,
) -> Result<()> {
    let source = input::read_pcm(input)?;
    let encoder = opus_async::create_encoder(
        &LibOpus,
        source.sample_rate,
        source.channels,
        opts.bitrate,
        opts.voice,
    )
    .with_context(|| {
        format!(
            "create encoder ({} Hz, {} ch)",
            source.sample_rate, source.channels
        )
    })?;
    tracing::info!(
        session = encoder.id().get(),
        sample_rate = source.sample_rate,
        channels = source.channels,
        bitrate = ?encoder.bitrate(),
        application = ?encoder.application(),
        frame_ms = opts.frame_ms,
        "encoding"
    );

    let file = File::create(output).with_context(|| format!("create {:?}", output))?;
    let mut out = BufWriter::new(file);
    container::write_header(
        &mut out,
        StreamHeader {
            sample_rate: source.sample_rate,
            channels: source.channels,
        },
    )?;

    let frame_len =
        pcm::frame_samples(source.sample_rate, opts.frame_ms) * source.channels as usize;
    let h = rt.handle();
    let (stats, mut out) = rt.block_on(async move {
        let stats =
            stream::encode_stream(&h, &encoder, &source.samples, frame_len, &mut out).await;
        encoder.close();
        stats.map(|stats| (stats, out))
    })??;
    out.flush()?;

    tracing::info!(
        packets = stats.packets,
        bytes = stats.bytes,
        output = ?output,
        "encode finished"
    );
    Ok(())
}

fn decode_file(rt: &Runtime, input: &Path, output: &Path, fec: bool) -> Result<()> {
    let file = File::open(input).with_context(|| format!("open {:?}", input))?;
    let mut reader = BufReader::new(file);
    let header = container::read_header(&mut reader).context("read stream header")?;

    let decoder = opus_async::create_decoder(&LibOpus, header.sample_rate, header.channels)
        .with_context(|| {
            format!(
                "create decoder ({} Hz, {} ch)",
                header.sample_rate, header.channels
            )
        })?;
    tracing::info!(
        session = decoder.id().get(),
        sample_rate = header.sample_rate,
        channels = header.channels,
        fec,
        "decoding"
    );

    let file = File::create(output).with_context(|| format!("create {:?}", output))?;
    let mut out = BufWriter::new(file);
    let h = rt.handle();
    let (stats, mut out) = rt.block_on(async move {
        let stats = stream::decode_stream(&h, &decoder, &mut reader, fec, &mut out).await;
        decoder.close();
        stats.map(|stats| (stats, out))
    })??;
    out.flush()?;

    tracing::info!(
        packets = stats.packets,
        lost = stats.lost,
        recovered = stats.recovered,
        samples = stats.samples,
        output = ?output,
        "decode finished"
    );
    Ok(())
}
