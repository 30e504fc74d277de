use std::collections::HashMap;
use std::sync::Mutex;

use adsync::entity::sync_type::SyncType;
use adsync::sync::SyncProgress;
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use uuid::Uuid;

/// Progress of one running stage.
struct StageState {
    bar: ProgressBar,
    parents_started: u64,
    saved: u64,
    failed: usize,
}

/// Consolidated progress state to avoid multiple mutex locks.
#[derive(Default)]
struct ProgressState {
    stages: HashMap<(Uuid, SyncType), StageState>,
    /// Stage of the connection a parent event belongs to. Parent events
    /// carry no connection id; with one connection per run this is exact.
    current: HashMap<SyncType, Uuid>,
}

impl ProgressState {
    fn current_stage(&mut self, sync_type: SyncType) -> Option<&mut StageState> {
        let connection_id = *self.current.get(&sync_type)?;
        self.stages.get_mut(&(connection_id, sync_type))
    }
}

/// Interactive progress reporter using indicatif.
pub struct InteractiveReporter {
    multi: MultiProgress,
    state: Mutex<ProgressState>,
}

impl InteractiveReporter {
    pub fn new() -> Self {
        Self {
            multi: MultiProgress::new(),
            state: Mutex::new(ProgressState::default()),
        }
    }

    pub fn handle(&self, event: SyncProgress) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());

        match event {
            SyncProgress::StageStarted {
                connection_id,
                sync_type,
                parents,
            } => {
                let pb = self.multi.add(ProgressBar::new(parents as u64));
                pb.set_style(Self::bar_style());
                pb.set_prefix(format!("{:12}", sync_type.as_str()));
                pb.set_message("starting...");

                state.current.insert(sync_type, connection_id);
                state.stages.insert(
                    (connection_id, sync_type),
                    StageState {
                        bar: pb,
                        parents_started: 0,
                        saved: 0,
                        failed: 0,
                    },
                );
            }

            SyncProgress::FetchingParent {
                sync_type,
                external_id,
            } => {
                if let Some(stage) = state.current_stage(sync_type) {
                    stage.bar.set_position(stage.parents_started);
                    stage.parents_started += 1;
                    stage.bar.set_message(external_id);
                }
            }

            SyncProgress::FetchedPage {
                sync_type,
                parent,
                page,
                count,
            } => {
                if let Some(stage) = state.current_stage(sync_type) {
                    stage
                        .bar
                        .set_message(format!("{parent} page {page} ({count})"));
                }
            }

            SyncProgress::Persisted { sync_type, count } => {
                if let Some(stage) = state.current_stage(sync_type) {
                    stage.saved += count;
                }
            }

            SyncProgress::ParentFailed {
                sync_type,
                external_id,
                error,
            } => {
                if let Some(stage) = state.current_stage(sync_type) {
                    stage.failed += 1;
                }
                drop(state);
                self.multi
                    .println(format!("✗ {sync_type} {external_id}: {error}"))
                    .ok();
            }

            SyncProgress::StageComplete {
                connection_id,
                sync_type,
                upserted,
                failures,
            } => {
                if let Some(stage) = state.stages.get(&(connection_id, sync_type)) {
                    if let Some(len) = stage.bar.length() {
                        stage.bar.set_position(len);
                    }
                    let msg = if failures > 0 {
                        format!("✓ {upserted} saved, {failures} parents failed")
                    } else {
                        format!("✓ {upserted} saved")
                    };
                    stage.bar.finish_with_message(msg);
                }
            }

            SyncProgress::StageFailed {
                connection_id,
                sync_type,
                error,
            } => match state.stages.get(&(connection_id, sync_type)) {
                Some(stage) => stage.bar.abandon_with_message(format!("✗ {error}")),
                None => {
                    drop(state);
                    self.multi.println(format!("✗ {sync_type}: {error}")).ok();
                }
            },

            SyncProgress::RateLimitBackoff {
                label,
                retry_after_ms,
                attempt,
            } => {
                drop(state);
                self.multi
                    .println(format!(
                        "⏳ {} rate limited, retry {} in {:.1}s",
                        label,
                        attempt,
                        retry_after_ms as f64 / 1000.0
                    ))
                    .ok();
            }

            SyncProgress::RenewalFailed {
                connection_id,
                error,
            } => {
                drop(state);
                self.multi
                    .println(format!("⚠ renewal failed for {connection_id}: {error}"))
                    .ok();
            }

            SyncProgress::Warning { message } => {
                drop(state);
                self.multi.println(format!("⚠ {}", message)).ok();
            }

            _ => {}
        }
    }

    pub fn finish(&self) {
        let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        for stage in state.stages.values() {
            if !stage.bar.is_finished() {
                stage
                    .bar
                    .finish_with_message(format!("{} saved, {} failed", stage.saved, stage.failed));
            }
        }
    }

    fn bar_style() -> ProgressStyle {
        ProgressStyle::default_bar()
            .template("{prefix:.bold.cyan} [{bar:40.cyan/blue}] {pos:>3}/{len:3} {msg}")
            .expect("Invalid template")
            .progress_chars("█▓░")
    }
}

impl Default for InteractiveReporter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stage_bar_tracks_parents_and_saves() {
        let reporter = InteractiveReporter::new();
        reporter.multi.set_draw_target(indicatif::ProgressDrawTarget::hidden());
        let connection_id = Uuid::new_v4();

        reporter.handle(SyncProgress::StageStarted {
            connection_id,
            sync_type: SyncType::Campaigns,
            parents: 2,
        });
        for ext in ["act_a", "act_b"] {
            reporter.handle(SyncProgress::FetchingParent {
                sync_type: SyncType::Campaigns,
                external_id: ext.to_string(),
            });
        }
        reporter.handle(SyncProgress::Persisted {
            sync_type: SyncType::Campaigns,
            count: 3,
        });
        reporter.handle(SyncProgress::ParentFailed {
            sync_type: SyncType::Campaigns,
            external_id: "act_a".to_string(),
            error: "boom".to_string(),
        });

        {
            let state = reporter.state.lock().unwrap();
            let stage = &state.stages[&(connection_id, SyncType::Campaigns)];
            assert_eq!(stage.parents_started, 2);
            assert_eq!(stage.bar.position(), 1);
            assert_eq!(stage.saved, 3);
            assert_eq!(stage.failed, 1);
        }

        reporter.handle(SyncProgress::StageComplete {
            connection_id,
            sync_type: SyncType::Campaigns,
            upserted: 3,
            failures: 1,
        });
        let state = reporter.state.lock().unwrap();
        let stage = &state.stages[&(connection_id, SyncType::Campaigns)];
        assert!(stage.bar.is_finished());
        assert_eq!(stage.bar.position(), 2);
    }

    #[test]
    fn events_for_unknown_stages_are_ignored() {
        let reporter = InteractiveReporter::new();
        reporter.multi.set_draw_target(indicatif::ProgressDrawTarget::hidden());
        reporter.handle(SyncProgress::FetchingParent {
            sync_type: SyncType::Ads,
            external_id: "s1".to_string(),
        });
        reporter.handle(SyncProgress::Persisted {
            sync_type: SyncType::Ads,
            count: 1,
        });
        assert!(reporter.state.lock().unwrap().stages.is_empty());
    }
}
