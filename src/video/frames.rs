use crate::{
    error::{ForensicsError, Result},
    image_utils::PixelBuffer,
    progress::CancellationToken,
};

pub trait FrameSource: Send + Sync {
    fn duration_secs(&self) -> f64;

    fn frame_at(&self, timestamp: f64) -> Result<PixelBuffer>;
}

#[derive(Debug, Clone)]
pub struct FrameSequence {
    frames: Vec<PixelBuffer>,
    fps: f64,
}

impl FrameSequence {
    pub fn new(frames: Vec<PixelBuffer>, fps: f64) -> Result<Self> {
        if !(fps.is_finite() && fps > 0.0) {
            return Err(ForensicsError::InvalidParameter(format!("invalid frame rate {fps}")));
        }
        Ok(Self { frames, fps })
    }
}

impl FrameSource for FrameSequence {
    fn duration_secs(&self) -> f64 {
        self.frames.len() as f64 / self.fps
    }

    fn frame_at(&self, timestamp: f64) -> Result<PixelBuffer> {
        let index = (timestamp.max(0.0) * self.fps) as usize;
        self.frames
            .get(index.min(self.frames.len().saturating_sub(1)))
            .cloned()
            .ok_or(ForensicsError::NoFrames)
    }
}

#[derive(Debug, Clone)]
pub struct SampledFrame {
    pub timestamp: f64,
    pub buffer: PixelBuffer,
    pub backfilled: bool,
}

pub fn sample_timestamps(duration_secs: f64, points: &[f64]) -> Vec<f64> {
    let duration = if duration_secs.is_finite() { duration_secs.max(0.0) } else { 0.0 };
    points.iter().map(|p| p.clamp(0.0, 1.0) * duration).collect()
}

fn extract(source: &dyn FrameSource, timestamp: f64) -> Result<PixelBuffer> {
    let buffer = source.frame_at(timestamp)?;
    buffer.validate()?;
    Ok(buffer)
}

/// Extracts a frame at every sampling point. A failed extraction reuses the
/// last good frame (or is dropped if there is none yet); if nothing decodes
/// the first frame is tried once more before giving up with `NoFrames`.
pub fn sample_frames(source: &dyn FrameSource, points: &[f64], cancel: &CancellationToken) -> Result<Vec<SampledFrame>> {
    let mut frames: Vec<SampledFrame> = Vec::with_capacity(points.len());

    for timestamp in sample_timestamps(source.duration_secs(), points) {
        cancel.check()?;
        match extract(source, timestamp) {
            Ok(buffer) => frames.push(SampledFrame {
                timestamp,
                buffer,
                backfilled: false,
            }),
            Err(e) => {
                let Some(last) = frames.last() else {
                    log::warn!("frame extraction failed at {timestamp:.2}s with nothing to backfill: {e}");
                    continue;
                };
                log::warn!("frame extraction failed at {timestamp:.2}s, reusing previous frame: {e}");
                let buffer = last.buffer.clone();
                frames.push(SampledFrame {
                    timestamp,
                    buffer,
                    backfilled: true,
                });
            }
        }
    }

    if frames.is_empty() {
        cancel.check()?;
        match extract(source, 0.0) {
            Ok(buffer) => frames.push(SampledFrame {
                timestamp: 0.0,
                buffer,
                backfilled: false,
            }),
            Err(e) => {
                log::warn!("no frame could be extracted: {e}");
                return Err(ForensicsError::NoFrames);
            }
        }
    }

    Ok(frames)
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    struct Flaky {
        duration: f64,
        failing: HashSet<u32>,
    }

    impl FrameSource for Flaky {
        fn duration_secs(&self) -> f64 {
            self.duration
        }

        fn frame_at(&self, timestamp: f64) -> Result<PixelBuffer> {
            let key = (timestamp * 10.0).round() as u32;
            if self.failing.contains(&key) {
                return Err(ForensicsError::Decode(format!("corrupt frame at {timestamp}")));
            }
            Ok(PixelBuffer::filled(32, 32, [key as u8, 0, 0]))
        }
    }

    const POINTS: [f64; 3] = [0.1, 0.5, 0.9];

    #[test]
    fn test_timestamps() {
        assert_eq!(sample_timestamps(10.0, &POINTS), vec![1.0, 5.0, 9.0]);
        assert_eq!(sample_timestamps(f64::NAN, &POINTS), vec![0.0, 0.0, 0.0]);
    }

    #[test]
    fn test_backfills_with_last_good_frame() {
        let source = Flaky {
            duration: 10.0,
            failing: [50, 90].into_iter().collect(),
        };
        let frames = sample_frames(&source, &POINTS, &CancellationToken::new()).unwrap();

        assert_eq!(frames.len(), 3);
        assert!(!frames[0].backfilled);
        assert!(frames[1].backfilled && frames[2].backfilled);
        assert_eq!(frames[2].buffer.rgb_at(0, 0), [10, 0, 0]);
    }

    #[test]
    fn test_leading_failure_is_dropped() {
        let source = Flaky {
            duration: 10.0,
            failing: [10].into_iter().collect(),
        };
        let frames = sample_frames(&source, &POINTS, &CancellationToken::new()).unwrap();
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0].timestamp, 5.0);
    }

    #[test]
    fn test_falls_back_to_first_frame() {
        let source = Flaky {
            duration: 10.0,
            failing: [10, 50, 90].into_iter().collect(),
        };
        let frames = sample_frames(&source, &POINTS, &CancellationToken::new()).unwrap();
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].timestamp, 0.0);
    }

    #[test]
    fn test_no_frames() {
        let source = Flaky {
            duration: 10.0,
            failing: [0, 10, 50, 90].into_iter().collect(),
        };
        let err = sample_frames(&source, &POINTS, &CancellationToken::new()).unwrap_err();
        assert!(err.is_no_frames());
    }

    #[test]
    fn test_invalid_buffers_count_as_failures() {
        struct Tiny;
        impl FrameSource for Tiny {
            fn duration_secs(&self) -> f64 {
                1.0
            }
            fn frame_at(&self, _timestamp: f64) -> Result<PixelBuffer> {
                Ok(PixelBuffer::filled(4, 4, [0, 0, 0]))
            }
        }

        let err = sample_frames(&Tiny, &POINTS, &CancellationToken::new()).unwrap_err();
        assert!(matches!(err, ForensicsError::NoFrames));
    }

    #[test]
    fn test_frame_sequence_lookup() {
        let frames = (0..10).map(|i| PixelBuffer::filled(32, 32, [i, 0, 0])).collect();
        let sequence = FrameSequence::new(frames, 5.0).unwrap();

        assert_eq!(sequence.duration_secs(), 2.0);
        assert_eq!(sequence.frame_at(1.0).unwrap().rgb_at(0, 0), [5, 0, 0]);
        assert_eq!(sequence.frame_at(99.0).unwrap().rgb_at(0, 0), [9, 0, 0]);
    }
}
