use crate::error::{HarnessError, Result};

/// One (context length, depth percent) configuration, evaluated once.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Trial {
    pub context_length: usize,
    pub depth_percent: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DepthIntervalType {
    Linear,
    Sigmoid,
}

impl DepthIntervalType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DepthIntervalType::Linear => "linear",
            DepthIntervalType::Sigmoid => "sigmoid",
        }
    }

    pub fn from_str(value: &str) -> Option<Self> {
        match value.to_lowercase().as_str() {
            "linear" => Some(DepthIntervalType::Linear),
            "sigmoid" => Some(DepthIntervalType::Sigmoid),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SweepConfig {
    pub context_min: usize,
    pub context_max: usize,
    pub context_intervals: usize,
    pub depth_min: f64,
    pub depth_max: f64,
    pub depth_intervals: usize,
    pub depth_interval_type: DepthIntervalType,
    /// Inclusive `[s_len, e_len]` filter; context lengths outside it are
    /// skipped without being recorded.
    pub length_range: Option<(usize, usize)>,
}

impl SweepConfig {
    pub fn context_lengths(&self) -> Result<Vec<usize>> {
        self.validate()?;
        Ok(
            linspace(self.context_min as f64, self.context_max as f64, self.context_intervals)
                .into_iter()
                .map(|value| value.round() as usize)
                .collect(),
        )
    }

    pub fn depth_percents(&self) -> Result<Vec<f64>> {
        self.validate()?;
        let raw = linspace(self.depth_min, self.depth_max, self.depth_intervals);
        Ok(match self.depth_interval_type {
            DepthIntervalType::Linear => raw.into_iter().map(|value| value.round()).collect(),
            DepthIntervalType::Sigmoid => raw.into_iter().map(logistic).collect(),
        })
    }

    /// Full cross product in length-major order: deterministic, stable, and
    /// therefore resumable.
    pub fn plan(&self) -> Result<Vec<Trial>> {
        let lengths = self.context_lengths()?;
        let depths = self.depth_percents()?;
        let mut trials = Vec::with_capacity(lengths.len() * depths.len());
        for &context_length in &lengths {
            if let Some((s_len, e_len)) = self.length_range {
                if context_length < s_len || context_length > e_len {
                    continue;
                }
            }
            for &depth_percent in &depths {
                trials.push(Trial {
                    context_length,
                    depth_percent,
                });
            }
        }
        Ok(trials)
    }

    fn validate(&self) -> Result<()> {
        if self.context_intervals == 0 || self.depth_intervals == 0 {
            return Err(HarnessError::Configuration(
                "interval counts must be positive".to_string(),
            ));
        }
        if self.context_min == 0 || self.context_min > self.context_max {
            return Err(HarnessError::Configuration(format!(
                "invalid context length range {}..{}",
                self.context_min, self.context_max
            )));
        }
        if !(0.0..=100.0).contains(&self.depth_min)
            || !(0.0..=100.0).contains(&self.depth_max)
            || self.depth_min > self.depth_max
        {
            return Err(HarnessError::Configuration(format!(
                "invalid depth range {}..{}",
                self.depth_min, self.depth_max
            )));
        }
        Ok(())
    }
}

fn linspace(min: f64, max: f64, num: usize) -> Vec<f64> {
    match num {
        0 => Vec::new(),
        1 => vec![min],
        _ => {
            let step = (max - min) / (num - 1) as f64;
            (0..num).map(|i| min + step * i as f64).collect()
        }
    }
}

/// Logistic depth map. Exact at both endpoints so the sweep still touches
/// depth 0 and depth 100 despite the asymptotes.
fn logistic(x: f64) -> f64 {
    if x == 0.0 {
        return 0.0;
    }
    if x == 100.0 {
        return 100.0;
    }
    const L: f64 = 100.0;
    const X0: f64 = 50.0;
    const K: f64 = 0.1;
    let value = L / (1.0 + (-K * (x - X0)).exp());
    (value * 1000.0).round() / 1000.0
}
