//! Audio probing for downloaded call recordings.
//!
//! A recording is probed before transcription so malformed downloads
//! are caught early and the call length can appear in the digest.

use std::path::Path;

use anyhow::{Context, Result};
use symphonia::core::codecs::CODEC_TYPE_NULL;
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::probe::Hint;

use crate::domain::CallDuration;

/// Probe the playable length of an audio file.
///
/// Uses the container's frame count when the demuxer reports one,
/// otherwise walks the packets and sums their durations. Fails on
/// unrecognized containers and on files with no playable frames.
pub fn probe_duration(path: &Path) -> Result<CallDuration> {
    let file = std::fs::File::open(path)
        .with_context(|| format!("Failed to open audio file: {}", path.display()))?;
    let mss = MediaSourceStream::new(Box::new(file), Default::default());

    let mut hint = Hint::new();
    if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
        hint.with_extension(ext);
    }

    let probed = symphonia::default::get_probe()
        .format(&hint, mss, &Default::default(), &Default::default())
        .with_context(|| format!("Unrecognized audio format: {}", path.display()))?;
    let mut format = probed.format;

    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .context("No playable audio track found")?;
    let track_id = track.id;
    let n_frames = track.codec_params.n_frames;
    let sample_rate = track.codec_params.sample_rate;
    let time_base = track.codec_params.time_base;

    let total_seconds = match (n_frames, sample_rate) {
        (Some(frames), Some(rate)) if rate > 0 => frames as f64 / rate as f64,
        _ => {
            let time_base = time_base.context("Audio track carries no timing information")?;
            let mut frames: u64 = 0;
            loop {
                let packet = match format.next_packet() {
                    Ok(packet) => packet,
                    // End of stream surfaces as an IO error.
                    Err(SymphoniaError::IoError(_)) => break,
                    Err(e) => return Err(e).context("Failed to read audio packet"),
                };
                if packet.track_id() != track_id {
                    continue;
                }
                frames += packet.dur();
            }
            let time = time_base.calc_time(frames);
            time.seconds as f64 + time.frac
        }
    };

    if total_seconds <= 0.0 {
        anyhow::bail!("Audio file contains no playable frames: {}", path.display());
    }

    Ok(CallDuration::from_seconds(total_seconds.round() as u64))
}
