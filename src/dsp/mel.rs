//! Triangular mel filterbank.
//!
//! Maps a one-sided power spectrum onto `n_mels` overlapping triangular
//! filters spaced on the mel scale, denser at low frequencies.

/// Configuration for the mel filterbank.
#[derive(Debug, Clone, Copy)]
pub struct MelConfig {
    pub sample_rate: u32,
    pub n_fft: usize,
    pub n_mels: usize,
    pub f_min: f32,
    pub f_max: f32,
}

/// Dense triangular filterbank, weights laid out row-major `[n_mels][n_freqs]`.
#[derive(Debug, Clone)]
pub struct MelFilterbank {
    n_mels: usize,
    n_freqs: usize,
    weights: Vec<f32>,
}

fn hz_to_mel(hz: f32) -> f32 {
    2595.0 * (1.0 + hz / 700.0).log10()
}

fn mel_to_hz(mel: f32) -> f32 {
    700.0 * (10.0f32.powf(mel / 2595.0) - 1.0)
}

impl MelFilterbank {
    /// Builds the filterbank. The frequency range is clamped to
    /// `[0, sample_rate / 2]`; degenerate triangles are left empty.
    pub fn new(config: MelConfig) -> Self {
        let n_freqs = config.n_fft / 2 + 1;
        let mut weights = vec![0.0f32; config.n_mels * n_freqs];

        let f_min = config.f_min.max(0.0);
        let f_max = config.f_max.min(config.sample_rate as f32 / 2.0);

        let mel_min = hz_to_mel(f_min);
        let mel_max = hz_to_mel(f_max);

        // Band edges: n_mels + 2 points evenly spaced in mel, snapped to bins.
        let n_points = config.n_mels + 2;
        let mut bins = vec![0usize; n_points];
        for (i, bin) in bins.iter_mut().enumerate() {
            let t = i as f32 / (n_points - 1) as f32;
            let hz = mel_to_hz(mel_min + t * (mel_max - mel_min));
            let b = ((config.n_fft + 1) as f32 * hz / config.sample_rate as f32).floor() as isize;
            *bin = b.clamp(0, n_freqs as isize - 1) as usize;
        }

        for m in 0..config.n_mels {
            let left = bins[m];
            let center = bins[m + 1];
            let right = bins[m + 2];

            if right <= left {
                continue;
            }

            let row = &mut weights[m * n_freqs..(m + 1) * n_freqs];
            if center > left {
                let denom = (center - left) as f32;
                for k in left..center {
                    row[k] = (k - left) as f32 / denom;
                }
            }
            if right > center {
                let denom = (right - center) as f32;
                for k in center..=right {
                    let val = (right - k) as f32 / denom;
                    row[k] = row[k].max(val);
                }
            }
        }

        Self {
            n_mels: config.n_mels,
            n_freqs,
            weights,
        }
    }

    pub fn n_mels(&self) -> usize {
        self.n_mels
    }

    pub fn n_freqs(&self) -> usize {
        self.n_freqs
    }

    /// Applies the filterbank: `power` has `n_freqs` values, `out_mel` is
    /// overwritten with `n_mels` band energies.
    pub fn apply(&self, power: &[f32], out_mel: &mut [f32]) {
        debug_assert_eq!(power.len(), self.n_freqs);
        debug_assert_eq!(out_mel.len(), self.n_mels);

        for (m, out) in out_mel.iter_mut().enumerate() {
            let row = &self.weights[m * self.n_freqs..(m + 1) * self.n_freqs];
            let mut acc = 0.0f32;
            for (w, p) in row.iter().zip(power.iter()) {
                acc += w * p;
            }
            *out = acc;
        }
    }
}
