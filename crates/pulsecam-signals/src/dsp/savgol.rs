//! Savitzky-Golay smoothing (quadratic fit), evaluated at the window centre.

use std::collections::VecDeque;

use crate::error::ConfigError;

const SG3: [f32; 3] = [0.15, 0.7, 0.15];
const SG5: [f32; 5] = [-3.0, 12.0, 17.0, 12.0, -3.0];
const SG7: [f32; 7] = [-2.0, 3.0, 6.0, 7.0, 6.0, 3.0, -2.0];
const SG9: [f32; 9] = [-21.0, 14.0, 39.0, 54.0, 59.0, 54.0, 39.0, 14.0, -21.0];

/// Normalised coefficients for an odd window in 3..=9
pub fn coefficients(window: usize) -> Result<Vec<f32>, ConfigError> {
    let (raw, norm): (&[f32], f32) = match window {
        3 => (&SG3[..], 1.0),
        5 => (&SG5[..], 35.0),
        7 => (&SG7[..], 21.0),
        9 => (&SG9[..], 231.0),
        _ => {
            return Err(ConfigError::invalid(format!(
                "Savitzky-Golay window must be one of 3, 5, 7, 9 (got {window})"
            )))
        }
    };
    Ok(raw.iter().map(|c| c / norm).collect())
}

#[derive(Debug, Clone)]
pub struct SavitzkyGolay {
    coeffs: Vec<f32>,
    buffer: VecDeque<f32>,
}

impl SavitzkyGolay {
    pub fn new(window: usize) -> Result<Self, ConfigError> {
        let coeffs = coefficients(window)?;
        Ok(Self {
            buffer: VecDeque::with_capacity(coeffs.len()),
            coeffs,
        })
    }

    pub fn window(&self) -> usize {
        self.coeffs.len()
    }

    /// Push a sample; until the window fills the sample passes through
    pub fn push(&mut self, value: f32) -> f32 {
        if self.buffer.len() >= self.coeffs.len() {
            self.buffer.pop_front();
        }
        self.buffer.push_back(value);

        if self.buffer.len() < self.coeffs.len() {
            return value;
        }
        self.buffer
            .iter()
            .zip(&self.coeffs)
            .map(|(v, c)| v * c)
            .sum()
    }

    pub fn reset(&mut self) {
        self.buffer.clear();
    }
}
