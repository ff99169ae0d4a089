use crate::codec::DecodedAudio;

/// Down-mix interleaved samples to mono by averaging channels.
#[must_use]
pub fn to_mono(samples: &[f32], channels: usize) -> Vec<f32> {
    if channels <= 1 {
        return samples.to_vec();
    }
    samples
        .chunks_exact(channels)
        .map(|frame| frame.iter().sum::<f32>() / channels as f32)
        .collect()
}

/// Linear-interpolation resampling.
#[must_use]
pub fn resample(samples: &[f32], from_rate: u32, to_rate: u32) -> Vec<f32> {
    if from_rate == to_rate || from_rate == 0 || to_rate == 0 {
        return samples.to_vec();
    }

    let ratio = f64::from(from_rate) / f64::from(to_rate);
    let output_len = (samples.len() as f64 / ratio) as usize;
    let mut output = Vec::with_capacity(output_len);

    for i in 0..output_len {
        let pos = i as f64 * ratio;
        let idx = pos as usize;
        if idx + 1 < samples.len() {
            let frac = (pos - idx as f64) as f32;
            output.push(samples[idx].mul_add(1.0 - frac, samples[idx + 1] * frac));
        } else if idx < samples.len() {
            output.push(samples[idx]);
        }
    }

    output
}

/// Mono samples of `audio` at `sample_rate`, ready for fingerprinting.
#[must_use]
pub fn prepare(audio: &DecodedAudio, sample_rate: u32) -> Vec<f32> {
    let mono = to_mono(&audio.samples, usize::from(audio.format.channels));
    resample(&mono, audio.format.sample_rate, sample_rate)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resample_identity() {
        let samples = vec![1.0, 2.0, 3.0, 4.0, 5.0];
        assert_eq!(resample(&samples, 44100, 44100), samples);
    }

    #[test]
    fn test_resample_downsample() {
        let samples = vec![1.0, 2.0, 3.0, 4.0];
        let resampled = resample(&samples, 44100, 22050);
        assert_eq!(resampled, vec![1.0, 3.0]);
    }

    #[test]
    fn test_resample_upsample_interpolates() {
        let samples = vec![1.0, 2.0];
        let resampled = resample(&samples, 22050, 44100);
        assert_eq!(resampled, vec![1.0, 1.5, 2.0, 2.0]);
    }

    #[test]
    fn test_to_mono_averages() {
        let stereo = [1.0, 0.0, 0.5, 0.5, -1.0, 1.0];
        assert_eq!(to_mono(&stereo, 2), vec![0.5, 0.5, 0.0]);
        assert_eq!(to_mono(&stereo, 1), stereo.to_vec());
    }
}
