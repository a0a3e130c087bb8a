use std::collections::BTreeMap;

use serde::Serialize;

use crate::{AnalysisResult, detection::verdict::Verdict, video::TemporalSummary};

#[derive(Debug, Serialize)]
pub struct JsonReport {
    pub summary: SummarySection,
    pub methods: Vec<MethodSection>,
    pub temporal: Option<TemporalSection>,
    pub indicators: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct SummarySection {
    pub confidence: u8,
    pub verdict: Verdict,
    pub verdict_label: &'static str,
    pub faces_detected: usize,
    pub frame_count: usize,
    pub processing_time_seconds: f64,
}

#[derive(Debug, Serialize)]
pub struct MethodSection {
    pub method: String,
    pub score: u8,
    pub degraded: bool,
}

#[derive(Debug, Serialize)]
pub struct TemporalSection {
    pub frame_scores: Vec<u8>,
    pub std_dev: f64,
    pub adjustment: f64,
    pub blinks_per_second: Option<f64>,
    pub blink_score: Option<f64>,
    pub pupil_variation_percent: Option<f64>,
    pub pupil_score: Option<f64>,
}

impl From<&TemporalSummary> for TemporalSection {
    fn from(summary: &TemporalSummary) -> Self {
        Self {
            frame_scores: summary.frame_scores.clone(),
            std_dev: summary.std_dev,
            adjustment: summary.adjustment,
            blinks_per_second: summary.blink.as_ref().map(|b| b.blinks_per_second),
            blink_score: summary.blink.as_ref().map(|b| b.score),
            pupil_variation_percent: summary.pupil.as_ref().map(|p| p.variation_percent),
            pupil_score: summary.pupil.as_ref().map(|p| p.score),
        }
    }
}

impl From<&AnalysisResult> for JsonReport {
    fn from(result: &AnalysisResult) -> Self {
        Self {
            summary: SummarySection {
                confidence: result.confidence,
                verdict: result.verdict,
                verdict_label: result.verdict.label(),
                faces_detected: result.faces_detected,
                frame_count: result.frame_count,
                processing_time_seconds: result.processing_time_seconds,
            },
            methods: method_sections(&result.per_method_scores, &result.failed_detectors),
            temporal: result.temporal.as_ref().map(TemporalSection::from),
            indicators: result.indicators.clone(),
        }
    }
}

fn method_sections(scores: &BTreeMap<String, u8>, failed: &[String]) -> Vec<MethodSection> {
    scores
        .iter()
        .map(|(method, &score)| MethodSection {
            method: method.clone(),
            score,
            degraded: failed.contains(method),
        })
        .collect()
}

impl JsonReport {
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}
