//! Bottleneck prediction over a forward fab simulation.

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use vf_core::{
    EquipmentId, EquipmentType, Hours, LotId, PopulationSource, RandomSource, Result, SimError,
};
use vf_runtime::config::validate_horizon;
use vf_runtime::{FabSimulator, RunConfig};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Severity {
    Critical,
    High,
    Medium,
    Low,
}

impl Severity {
    /// Bucket for a terminal queue length; `None` below the reporting threshold.
    pub fn classify(queue_length: usize, cfg: &PredictorConfig) -> Option<Self> {
        if queue_length > cfg.critical_threshold {
            Some(Severity::Critical)
        } else if queue_length > cfg.high_threshold {
            Some(Severity::High)
        } else if queue_length > cfg.queue_threshold {
            Some(Severity::Medium)
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PredictorConfig {
    /// Queues longer than this are reported.
    pub queue_threshold: usize,
    pub high_threshold: usize,
    pub critical_threshold: usize,
    pub wait_hours_per_lot: Hours,
    pub confidence_base: f64,
    pub confidence_spread: f64,
    /// Lower bound of the predicted onset, clamped to the horizon.
    pub earliest_onset_hours: Hours,
}

impl Default for PredictorConfig {
    fn default() -> Self {
        Self {
            queue_threshold: 5,
            high_threshold: 10,
            critical_threshold: 15,
            wait_hours_per_lot: 1.5,
            confidence_base: 75.0,
            confidence_spread: 20.0,
            earliest_onset_hours: 4.0,
        }
    }
}

impl PredictorConfig {
    pub fn validate(&self) -> Result<()> {
        if !(self.queue_threshold <= self.high_threshold && self.high_threshold <= self.critical_threshold) {
            return Err(SimError::invalid(
                "critical_threshold",
                "thresholds must satisfy queue <= high <= critical",
            ));
        }
        let non_negative = [
            ("wait_hours_per_lot", self.wait_hours_per_lot),
            ("confidence_base", self.confidence_base),
            ("confidence_spread", self.confidence_spread),
            ("earliest_onset_hours", self.earliest_onset_hours),
        ];
        for (name, value) in non_negative {
            if !value.is_finite() || value < 0.0 {
                return Err(SimError::invalid(name, "must be finite and >= 0"));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BottleneckPrediction {
    pub bottleneck_id: String,
    pub equipment_id: EquipmentId,
    pub equipment_type: EquipmentType,
    pub predicted_queue_length: usize,
    pub predicted_wait_hours: Hours,
    pub severity: Severity,
    pub confidence: f64,
    /// Offset from the start of the horizon; callers anchor it to wall-clock time.
    pub predicted_in_hours: Hours,
    pub affected_lots: Vec<LotId>,
    pub recommended_actions: Vec<String>,
}

/// Produces bottleneck predictions for the next `horizon_hours`.
pub trait BottleneckPredictor {
    fn predict(&mut self, horizon_hours: Hours) -> Result<Vec<BottleneckPrediction>>;
}

/// Runs one simulation over the horizon and reports tools whose terminal
/// queue crosses the configured thresholds.
pub struct SimulatedBottleneckPredictor<R: RandomSource> {
    config: PredictorConfig,
    source: PopulationSource,
    run_config: RunConfig,
    rng: R,
}

/// Terminal view of one tool, taken before the simulator is dropped.
struct QueueAtHorizon {
    equipment_id: EquipmentId,
    equipment_type: EquipmentType,
    lots: Vec<LotId>,
}

impl<R: RandomSource> SimulatedBottleneckPredictor<R> {
    pub fn new(config: PredictorConfig, source: PopulationSource, run_config: RunConfig, rng: R) -> Result<Self> {
        config.validate()?;
        run_config.validate()?;
        Ok(Self { config, source, run_config, rng })
    }

    pub fn config(&self) -> &PredictorConfig {
        &self.config
    }

    fn simulate(&mut self, horizon_hours: Hours) -> Result<Vec<QueueAtHorizon>> {
        let mut sim = FabSimulator::from_source(&self.source, self.run_config.clone(), &mut self.rng)?;
        sim.run(horizon_hours)?;
        Ok(sim
            .state()
            .equipment()
            .iter()
            .map(|eq| QueueAtHorizon {
                equipment_id: eq.equipment_id.clone(),
                equipment_type: eq.equipment_type,
                lots: eq.queue.iter().cloned().collect(),
            })
            .collect())
    }

    fn recommendations(&self, tool: &QueueAtHorizon) -> Vec<String> {
        let len = tool.lots.len();
        let mut actions = Vec::new();
        if len > self.config.critical_threshold {
            actions.push(format!("Urgent: add capacity or run overtime on {}", tool.equipment_id));
            actions.push("Process high-priority lots first and hold low-priority lots".to_string());
        }
        if len > self.config.high_threshold {
            actions.push(format!("Review reassigning lots to other {} tools", tool.equipment_type));
            actions.push("Review the maintenance schedule".to_string());
        }
        actions.push(format!("Tune process parameters on {} to shorten process time", tool.equipment_id));
        actions
    }
}

impl<R: RandomSource> BottleneckPredictor for SimulatedBottleneckPredictor<R> {
    fn predict(&mut self, horizon_hours: Hours) -> Result<Vec<BottleneckPrediction>> {
        validate_horizon("horizon_hours", horizon_hours)?;
        let tools = self.simulate(horizon_hours)?;

        let mut predictions = Vec::new();
        for tool in tools {
            let queue_length = tool.lots.len();
            let Some(severity) = Severity::classify(queue_length, &self.config) else {
                continue;
            };
            let recommended_actions = self.recommendations(&tool);
            let earliest = self.config.earliest_onset_hours.min(horizon_hours);
            let prediction = BottleneckPrediction {
                bottleneck_id: format!("BN-{:08X}", self.rng.next_u64() as u32),
                predicted_queue_length: queue_length,
                predicted_wait_hours: queue_length as f64 * self.config.wait_hours_per_lot,
                severity,
                confidence: self.config.confidence_base + self.rng.uniform(0.0, self.config.confidence_spread),
                predicted_in_hours: self.rng.uniform(earliest, horizon_hours),
                recommended_actions,
                equipment_id: tool.equipment_id,
                equipment_type: tool.equipment_type,
                affected_lots: tool.lots,
            };
            debug!(
                equipment_id = %prediction.equipment_id,
                queue_length,
                severity = ?prediction.severity,
                "bottleneck predicted"
            );
            predictions.push(prediction);
        }

        predictions.sort_by_key(|p| p.severity);
        info!(horizon_hours, bottlenecks = predictions.len(), "bottleneck prediction finished");
        Ok(predictions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use vf_core::{EquipmentRecord, EquipmentStatus, LotRecord, PopulationSnapshot, RouteStep, SimRng};

    fn tool(id: &str, equipment_type: EquipmentType) -> EquipmentRecord {
        EquipmentRecord {
            equipment_id: id.into(),
            equipment_type,
            capacity_wph: None,
            mtbf_hours: None,
            mttr_hours: None,
            status: EquipmentStatus::Idle,
        }
    }

    /// `loads` lots per tool, all arriving at 0 on a single ten-hour step.
    fn loaded_fab(loads: &[(&str, EquipmentType, usize)]) -> PopulationSource {
        let mut equipment = Vec::new();
        let mut lots = Vec::new();
        for &(id, equipment_type, count) in loads {
            equipment.push(tool(id, equipment_type));
            for n in 0..count {
                lots.push(LotRecord {
                    lot_id: format!("{id}-L{n:02}"),
                    wafer_count: 25,
                    current_step: 1,
                    total_steps: 1,
                    priority: 5,
                    route: Some(vec![RouteStep {
                        step: 1,
                        operation: "OP-001".into(),
                        equipment_type,
                        process_time_hours: 10.0,
                    }]),
                    arrival_time: 0.0,
                });
            }
        }
        PopulationSource::Snapshot(PopulationSnapshot { equipment, lots, schedule_initial_failures: false })
    }

    fn predictor(source: PopulationSource) -> SimulatedBottleneckPredictor<SimRng> {
        SimulatedBottleneckPredictor::new(PredictorConfig::default(), source, RunConfig::default(), SimRng::new(3))
            .unwrap()
    }

    #[test]
    fn classify_buckets() {
        let cfg = PredictorConfig::default();
        assert_eq!(Severity::classify(5, &cfg), None);
        assert_eq!(Severity::classify(6, &cfg), Some(Severity::Medium));
        assert_eq!(Severity::classify(11, &cfg), Some(Severity::High));
        assert_eq!(Severity::classify(16, &cfg), Some(Severity::Critical));
    }

    #[test]
    fn ranks_by_severity() {
        // Queue at the horizon is the load minus the lot in process.
        let source = loaded_fab(&[
            ("CVD-01", EquipmentType::Cvd, 7),
            ("ETCH-01", EquipmentType::Etcher, 20),
            ("CMP-01", EquipmentType::Cmp, 3),
            ("LITHO-01", EquipmentType::Lithography, 12),
        ]);
        let out = predictor(source).predict(5.0).unwrap();

        let ids: Vec<&str> = out.iter().map(|p| p.equipment_id.as_str()).collect();
        assert_eq!(ids, vec!["ETCH-01", "LITHO-01", "CVD-01"]);
        let severities: Vec<Severity> = out.iter().map(|p| p.severity).collect();
        assert_eq!(severities, vec![Severity::Critical, Severity::High, Severity::Medium]);

        let critical = &out[0];
        assert_eq!(critical.predicted_queue_length, 19);
        assert_eq!(critical.predicted_wait_hours, 28.5);
        assert_eq!(critical.affected_lots.len(), 19);
        assert_eq!(critical.affected_lots[0], "ETCH-01-L01");
        assert_eq!(critical.recommended_actions.len(), 5);
        assert_eq!(out[1].recommended_actions.len(), 3);
        assert_eq!(out[2].recommended_actions.len(), 1);
    }

    #[test]
    fn record_fields_stay_in_bounds() {
        let out = predictor(loaded_fab(&[("CVD-01", EquipmentType::Cvd, 9)])).predict(5.0).unwrap();
        assert_eq!(out.len(), 1);
        let p = &out[0];
        assert!(p.bottleneck_id.starts_with("BN-"));
        assert_eq!(p.bottleneck_id.len(), 11);
        assert!((75.0..=95.0).contains(&p.confidence));
        assert!((4.0..=5.0).contains(&p.predicted_in_hours));
    }

    #[test]
    fn short_horizon_clamps_onset() {
        let out = predictor(loaded_fab(&[("CVD-01", EquipmentType::Cvd, 9)])).predict(2.0).unwrap();
        assert_eq!(out[0].predicted_in_hours, 2.0);
    }

    #[test]
    fn quiet_fab_has_no_bottlenecks() {
        let out = predictor(loaded_fab(&[("CVD-01", EquipmentType::Cvd, 2)])).predict(24.0).unwrap();
        assert!(out.is_empty());
    }

    #[test]
    fn rejects_bad_horizon_and_thresholds() {
        let mut p = predictor(loaded_fab(&[("CVD-01", EquipmentType::Cvd, 2)]));
        assert!(p.predict(0.0).unwrap_err().is_config());
        assert!(p.predict(f64::INFINITY).unwrap_err().is_config());

        let cfg = PredictorConfig { high_threshold: 20, ..PredictorConfig::default() };
        let err = SimulatedBottleneckPredictor::new(cfg, PopulationSource::default(), RunConfig::default(), SimRng::new(1))
            .err()
            .unwrap();
        assert!(err.is_config());
    }

    #[test]
    fn severity_serializes_upper_case() {
        assert_eq!(serde_json::to_string(&Severity::Critical).unwrap(), "\"CRITICAL\"");
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(16))]

        #[test]
        fn synthetic_predictions_are_ordered(seed in any::<u64>(), horizon in 1.0f64..96.0) {
            let mut p = SimulatedBottleneckPredictor::new(
                PredictorConfig::default(),
                PopulationSource::default(),
                RunConfig::default(),
                SimRng::new(seed),
            )
            .unwrap();
            let out = p.predict(horizon).unwrap();
            prop_assert!(out.windows(2).all(|w| w[0].severity <= w[1].severity));
            for pred in &out {
                prop_assert!(pred.predicted_queue_length > 5);
                prop_assert_eq!(pred.affected_lots.len(), pred.predicted_queue_length);
                prop_assert!(pred.predicted_in_hours <= horizon);
            }
        }
    }
}
