//! Sample-rate conversion of decoded frames (rubato FFT resampler)

use rubato::{FftFixedIn, Resampler};

use super::DecodeError;
use crate::types::StereoSample;

/// Input chunk size fed to the resampler
const RESAMPLE_CHUNK_FRAMES: usize = 1024;
const RESAMPLE_SUB_CHUNKS: usize = 2;

fn resample_err(e: impl std::fmt::Display) -> DecodeError {
    DecodeError::Resample(e.to_string())
}

/// Convert stereo frames from `from_rate` to `to_rate`
///
/// The resampler's output delay is trimmed so the result lines up with the
/// source; the length is `round(len * to / from)`.
pub fn resample_frames(
    frames: &[StereoSample],
    from_rate: u32,
    to_rate: u32,
) -> Result<Vec<StereoSample>, DecodeError> {
    if from_rate == to_rate || frames.is_empty() {
        return Ok(frames.to_vec());
    }
    if from_rate == 0 || to_rate == 0 {
        return Err(DecodeError::Resample(format!(
            "invalid rates {} -> {}",
            from_rate, to_rate
        )));
    }

    let mut resampler = FftFixedIn::<f32>::new(
        from_rate as usize,
        to_rate as usize,
        RESAMPLE_CHUNK_FRAMES,
        RESAMPLE_SUB_CHUNKS,
        2,
    )
    .map_err(resample_err)?;

    let delay = resampler.output_delay();
    let expected = (frames.len() as f64 * to_rate as f64 / from_rate as f64).round() as usize;
    let mut left: Vec<f32> = Vec::with_capacity(expected + delay + RESAMPLE_CHUNK_FRAMES * 2);
    let mut right: Vec<f32> = Vec::with_capacity(left.capacity());
    let mut input = vec![Vec::with_capacity(RESAMPLE_CHUNK_FRAMES); 2];

    let fill = |input: &mut Vec<Vec<f32>>, chunk: &[StereoSample]| {
        input[0].clear();
        input[1].clear();
        input[0].extend(chunk.iter().map(|s| s.left));
        input[1].extend(chunk.iter().map(|s| s.right));
    };

    let mut pos = 0;
    loop {
        let needed = resampler.input_frames_next();
        if frames.len() - pos < needed {
            break;
        }
        fill(&mut input, &frames[pos..pos + needed]);
        let out = resampler.process(input.as_slice(), None).map_err(resample_err)?;
        left.extend_from_slice(&out[0]);
        right.extend_from_slice(&out[1]);
        pos += needed;
    }

    if pos < frames.len() {
        fill(&mut input, &frames[pos..]);
        let out = resampler
            .process_partial(Some(input.as_slice()), None)
            .map_err(resample_err)?;
        left.extend_from_slice(&out[0]);
        right.extend_from_slice(&out[1]);
    }

    // Flush the delay line
    while left.len() < expected + delay {
        let out = resampler
            .process_partial(None::<&[Vec<f32>]>, None)
            .map_err(resample_err)?;
        if out[0].is_empty() {
            break;
        }
        left.extend_from_slice(&out[0]);
        right.extend_from_slice(&out[1]);
    }

    Ok(left
        .iter()
        .zip(right.iter())
        .skip(delay)
        .take(expected)
        .map(|(&l, &r)| StereoSample::new(l, r))
        .collect())
}
