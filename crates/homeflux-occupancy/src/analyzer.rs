use homeflux_config::OccupancyConfig;
use serde::{Deserialize, Serialize};

/// 单帧分析结果
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FrameAnalysis {
    pub occupied: bool,
    pub confidence: f64,
    pub person_count: u32,
}

impl FrameAnalysis {
    /// 无法判断（空帧、过小或过暗）
    pub fn inconclusive() -> Self {
        Self {
            occupied: false,
            confidence: 0.1,
            person_count: 0,
        }
    }
}

/// 帧分析模型
///
/// 帧为已解码的原始字节，分析失败时返回错误，由检测器降级为低置信度结果。
#[cfg_attr(test, mockall::automock)]
pub trait FrameAnalyzer: Send + Sync {
    fn analyze(&self, frame: &[u8]) -> anyhow::Result<FrameAnalysis>;
}

/// 以平均亮度近似占用的分析器
#[derive(Debug, Clone)]
pub struct BrightnessAnalyzer {
    min_frame_bytes: usize,
    dark_threshold: f64,
    presence_threshold: f64,
}

impl BrightnessAnalyzer {
    pub fn new(min_frame_bytes: usize, dark_threshold: f64, presence_threshold: f64) -> Self {
        Self {
            min_frame_bytes,
            dark_threshold,
            presence_threshold,
        }
    }

    pub fn from_config(config: &OccupancyConfig) -> Self {
        Self::new(
            config.min_frame_bytes,
            config.dark_threshold,
            config.presence_threshold,
        )
    }

    /// 平均亮度，归一化到 0.0 - 1.0
    fn mean_brightness(frame: &[u8]) -> f64 {
        let sum: u64 = frame.iter().map(|b| u64::from(*b)).sum();
        sum as f64 / frame.len() as f64 / 255.0
    }
}

impl Default for BrightnessAnalyzer {
    fn default() -> Self {
        Self::from_config(&OccupancyConfig::default())
    }
}

impl FrameAnalyzer for BrightnessAnalyzer {
    fn analyze(&self, frame: &[u8]) -> anyhow::Result<FrameAnalysis> {
        if frame.is_empty() || frame.len() < self.min_frame_bytes {
            return Ok(FrameAnalysis::inconclusive());
        }

        let brightness = Self::mean_brightness(frame);
        if brightness < self.dark_threshold {
            return Ok(FrameAnalysis::inconclusive());
        }

        // 离阈值越远越可信，最低 0.5
        if brightness >= self.presence_threshold {
            let span = (1.0 - self.presence_threshold).max(f64::EPSILON);
            let confidence = 0.5 + 0.5 * (brightness - self.presence_threshold) / span;
            Ok(FrameAnalysis {
                occupied: true,
                confidence: confidence.clamp(0.5, 1.0),
                person_count: 1,
            })
        } else {
            let span = (self.presence_threshold - self.dark_threshold).max(f64::EPSILON);
            let confidence = 0.5 + 0.5 * (self.presence_threshold - brightness) / span;
            Ok(FrameAnalysis {
                occupied: false,
                confidence: confidence.clamp(0.5, 1.0),
                person_count: 0,
            })
        }
    }
}
