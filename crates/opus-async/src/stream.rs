//! Whole-stream encode and decode over a packet container.
//!
//! Every frame or packet is one job on the runtime; a session runs them one at
//! a time, in stream order. A zero-length container entry marks a lost packet.

use std::io::{Read, Write};

use anyhow::{Context, Result, bail};
use job_runtime::RuntimeHandle;

use crate::container;
use crate::pcm;
use crate::session::{DecoderHandle, EncoderHandle};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EncodeStats {
    pub packets: usize,
    pub bytes: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DecodeStats {
    /// Packets decoded normally.
    pub packets: usize,
    /// Loss markers read.
    pub lost: usize,
    /// Lost frames rebuilt from the following packet's FEC data.
    pub recovered: usize,
    /// Interleaved samples written.
    pub samples: usize,
}

/// Encode interleaved PCM in frames of `frame_len` samples (all channels) and
/// write one packet per frame. The last frame is padded with silence.
pub async fn encode_stream<W: Write>(
    rt: &RuntimeHandle,
    encoder: &EncoderHandle,
    samples: &[i16],
    frame_len: usize,
    out: &mut W,
) -> Result<EncodeStats> {
    if frame_len == 0 {
        bail!("frame length must be positive");
    }

    let mut stats = EncodeStats::default();
    let mut frame = Vec::with_capacity(frame_len);
    for chunk in samples.chunks(frame_len) {
        frame.clear();
        frame.extend_from_slice(chunk);
        frame.resize(frame_len, 0);

        let packet = encoder
            .encode(rt, &pcm::samples_to_bytes(&frame))
            .await
            .with_context(|| format!("encode frame {}", stats.packets))?;
        container::write_packet(&mut *out, &packet)?;
        stats.packets += 1;
        stats.bytes += packet.len();
    }
    Ok(stats)
}

/// Decode every packet from `input` and write raw interleaved s16le PCM.
///
/// Lost packets are skipped unless `fec` is set; then the frame lost right
/// before a packet is rebuilt from that packet, sized like the last decoded
/// frame. Earlier losses in a run, and losses before the first decoded packet,
/// cannot be rebuilt and are skipped.
pub async fn decode_stream<R: Read, W: Write>(
    rt: &RuntimeHandle,
    decoder: &DecoderHandle,
    input: &mut R,
    fec: bool,
    out: &mut W,
) -> Result<DecodeStats> {
    let channels = decoder.channels() as usize;
    let mut stats = DecodeStats::default();
    let mut missing = 0usize;
    let mut last_frame: Option<usize> = None;

    while let Some(packet) = container::read_packet(&mut *input)? {
        if packet.is_empty() {
            missing += 1;
            stats.lost += 1;
            continue;
        }

        if missing > 0 {
            let index = stats.packets + stats.lost;
            match last_frame {
                Some(frame) if fec => {
                    let pcm_bytes = decoder
                        .recover(rt, &packet, frame)
                        .await
                        .with_context(|| format!("recover frame before packet {index}"))?;
                    stats.samples += write_s16le(&mut *out, &pcm_bytes)?;
                    stats.recovered += 1;
                    if missing > 1 {
                        tracing::debug!(skipped = missing - 1, "lost frames not recoverable");
                    }
                }
                _ => tracing::debug!(skipped = missing, "lost frames skipped"),
            }
            missing = 0;
        }

        let pcm_bytes = decoder
            .decode(rt, &packet, false)
            .await
            .with_context(|| format!("decode packet {}", stats.packets + stats.lost))?;
        last_frame = Some(pcm_bytes.len() / pcm::SAMPLE_BYTES / channels);
        stats.samples += write_s16le(&mut *out, &pcm_bytes)?;
        stats.packets += 1;
    }

    if missing > 0 {
        tracing::debug!(skipped = missing, "trailing lost frames skipped");
    }
    Ok(stats)
}

/// Write native-endian PCM bytes as little-endian samples; returns the sample count.
fn write_s16le(out: &mut impl Write, pcm_bytes: &[u8]) -> Result<usize> {
    let samples = pcm::bytes_to_samples(pcm_bytes);
    for s in &samples {
        out.write_all(&s.to_le_bytes())?;
    }
    Ok(samples.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::StreamHeader;
    use crate::session::{create_decoder, create_encoder};
    use crate::testing::{FakeBackend, fake_packet};
    use job_runtime::{Runtime, RuntimeConfig};
    use std::io::Cursor;

    fn runtime() -> Runtime {
        Runtime::new(&RuntimeConfig {
            workers: 2,
            queue_capacity: None,
            thread_name: "stream-test".to_string(),
        })
        .unwrap()
    }

    fn packet_stream(entries: &[Vec<u8>]) -> Cursor<Vec<u8>> {
        let mut buf = Vec::new();
        for entry in entries {
            container::write_packet(&mut buf, entry).unwrap();
        }
        Cursor::new(buf)
    }

    fn le_samples(bytes: &[u8]) -> Vec<i16> {
        bytes
            .chunks_exact(2)
            .map(|b| i16::from_le_bytes([b[0], b[1]]))
            .collect()
    }

    fn decode_all(entries: &[Vec<u8>], fec: bool) -> (DecodeStats, Vec<i16>, FakeBackend) {
        let rt = runtime();
        let backend = FakeBackend::new();
        let dec = create_decoder(&backend, 48_000, 1).unwrap();
        let h = rt.handle();
        let mut input = packet_stream(entries);

        let (stats, out) = rt
            .block_on(async move {
                let mut out = Vec::new();
                let stats = decode_stream(&h, &dec, &mut input, fec, &mut out).await?;
                Ok::<_, anyhow::Error>((stats, out))
            })
            .unwrap()
            .unwrap();
        (stats, le_samples(&out), backend)
    }

    #[test]
    fn encode_stream_pads_last_frame_and_writes_one_packet_per_frame() {
        let rt = runtime();
        let backend = FakeBackend::new();
        let enc = create_encoder(&backend, 48_000, 2, -1, false).unwrap();
        let h = rt.handle();
        // Two full 20 ms stereo frames plus a partial one.
        let samples = vec![1i16; 960 * 2 * 2 + 10];

        let (stats, out) = rt
            .block_on(async move {
                let mut out = Vec::new();
                container::write_header(
                    &mut out,
                    StreamHeader {
                        sample_rate: 48_000,
                        channels: 2,
                    },
                )?;
                let stats = encode_stream(&h, &enc, &samples, 960 * 2, &mut out).await?;
                Ok::<_, anyhow::Error>((stats, out))
            })
            .unwrap()
            .unwrap();

        assert_eq!(stats, EncodeStats { packets: 3, bytes: 12 });
        assert_eq!(backend.log().encode_samples, vec![960 * 2; 3]);

        let mut r = Cursor::new(out);
        container::read_header(&mut r).unwrap();
        while let Some(packet) = container::read_packet(&mut r).unwrap() {
            assert_eq!(FakeBackend::frame_size_of(&packet), 960);
        }
    }

    #[test]
    fn encode_stream_rejects_zero_frame_length() {
        let rt = runtime();
        let backend = FakeBackend::new();
        let enc = create_encoder(&backend, 48_000, 1, -1, false).unwrap();
        let h = rt.handle();

        let err = rt
            .block_on(async move { encode_stream(&h, &enc, &[0; 4], 0, &mut Vec::new()).await })
            .unwrap()
            .unwrap_err();
        assert!(err.to_string().contains("frame length"));
    }

    #[test]
    fn decode_stream_never_asks_for_fec_without_a_loss() {
        let entries = vec![fake_packet(1, 0, 1), fake_packet(2, 0, 1), fake_packet(3, 0, 1)];
        let (stats, samples, backend) = decode_all(&entries, true);

        assert_eq!(backend.log().fec_flags, vec![false; 3]);
        assert_eq!(stats.packets, 3);
        assert_eq!(stats.recovered, 0);
        assert_eq!(samples.len(), 3 * 120);
    }

    #[test]
    fn decode_stream_rebuilds_lost_frame_from_next_packet() {
        let entries = vec![fake_packet(1, 0, 2), Vec::new(), fake_packet(3, 0, 2)];
        let (stats, samples, backend) = decode_all(&entries, true);

        assert_eq!(
            stats,
            DecodeStats {
                packets: 2,
                lost: 1,
                recovered: 1,
                samples: 3 * 240,
            }
        );
        // Rebuilt frame is the size of the previous one and comes before packet 3.
        assert!(samples[..240].iter().all(|&s| s == 1));
        assert!(samples[240..480].iter().all(|&s| s == -3));
        assert!(samples[480..].iter().all(|&s| s == 3));

        let log = backend.log();
        assert_eq!(log.fec_flags, vec![false, true, false]);
        assert_eq!(log.decode_capacity[1], 240);
    }

    #[test]
    fn decode_stream_skips_losses_without_fec() {
        let entries = vec![fake_packet(1, 0, 1), Vec::new(), fake_packet(3, 0, 1)];
        let (stats, samples, backend) = decode_all(&entries, false);

        assert_eq!(stats.lost, 1);
        assert_eq!(stats.recovered, 0);
        assert_eq!(samples.len(), 2 * 120);
        assert_eq!(backend.log().fec_flags, vec![false, false]);
    }

    #[test]
    fn decode_stream_recovers_only_the_frame_next_to_a_packet() {
        let entries = vec![
            Vec::new(),
            fake_packet(1, 0, 1),
            Vec::new(),
            Vec::new(),
            fake_packet(2, 0, 1),
            Vec::new(),
        ];
        let (stats, samples, backend) = decode_all(&entries, true);

        // Leading loss has no frame size to go by; trailing loss has no next packet.
        assert_eq!(stats.lost, 4);
        assert_eq!(stats.recovered, 1);
        assert_eq!(stats.packets, 2);
        assert_eq!(samples.len(), 3 * 120);
        assert_eq!(backend.log().fec_flags, vec![false, true, false]);
    }

    #[test]
    fn decode_stream_reports_which_packet_failed() {
        let entries = vec![fake_packet(1, 0, 1), FakeBackend::CORRUPT_PACKET.to_vec()];
        let rt = runtime();
        let backend = FakeBackend::new();
        let dec = create_decoder(&backend, 48_000, 1).unwrap();
        let h = rt.handle();
        let mut input = packet_stream(&entries);

        let err = rt
            .block_on(async move {
                decode_stream(&h, &dec, &mut input, false, &mut Vec::new()).await
            })
            .unwrap()
            .unwrap_err();
        assert!(format!("{err:#}").contains("decode packet 1"));
    }
}
