use std::collections::{HashMap, HashSet};

use anyhow::Result;
use chrono::{Duration, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use sqlx::MySqlPool;
use strum_macros::Display;
use tracing::info;
use uuid::Uuid;

use super::grouping::{self, ResolvedPunch};
use super::reconcile::{DaySchedules, Reconciled, reconcile_day};
use super::window::local_day;
use super::{EngineConfig, store};
use crate::model::attendance::{AttendanceEvent, AttendanceRecord};
use crate::model::device_mapping::DeviceKey;
use crate::model::punch_event::PunchEvent;
use crate::model::shift_schedule::ShiftSchedule;
use crate::models::RunSummary;
use crate::utils::{mapping_cache, mapping_filter};

/// Phases of one batch iteration, logged on every transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum BatchPhase {
    Idle,
    Fetching,
    Processing,
    Persisting,
    Done,
}

/// Everything one batch iteration wants to write, plus its counters.
/// Produced by the pure `plan_batch` so the whole step is testable without
/// a database; each bucket is persisted atomically (record + audit rows).
#[derive(Debug, PartialEq)]
pub struct BatchPlan {
    pub buckets: Vec<(AttendanceRecord, Vec<AttendanceEvent>)>,
    pub next_watermark: i64,
    pub events_seen: u64,
    pub skipped_no_mapping: u64,
    pub skipped_adjusted: u64,
    pub pending_buckets: u64,
}

/// Pure planning step: `(watermark, events, history, mappings, schedules,
/// adjusted)` in, records and the advanced watermark out. No I/O and no
/// clock; `now` is an argument.
///
/// The new `events` drive progress (watermark, counters) and decide which
/// `(employee, day)` buckets are touched; `history` is the complete punch
/// set for those employees' date span, and is what the reconciler actually
/// reads. A day whose check-in arrived in an earlier batch is therefore
/// re-derived from all of its punches, never from the new slice alone.
pub fn plan_batch(
    watermark: i64,
    events: &[PunchEvent],
    history: &[PunchEvent],
    mappings: &HashMap<DeviceKey, u64>,
    schedules: &HashMap<(u64, NaiveDate), ShiftSchedule>,
    adjusted: &HashSet<(u64, NaiveDate)>,
    now: NaiveDateTime,
    cfg: &EngineConfig,
) -> BatchPlan {
    let mut next_watermark = watermark;
    let mut events_seen = 0;
    let mut skipped_no_mapping = 0;
    let mut resolved_new = Vec::with_capacity(events.len());

    for event in events {
        if event.epoch <= watermark {
            continue;
        }
        events_seen += 1;
        next_watermark = next_watermark.max(event.epoch);

        let key = (event.device_id.clone(), event.device_user_code.clone());
        match mappings.get(&key) {
            Some(&employee_id) => resolved_new.push(ResolvedPunch {
                employee_id,
                event: event.clone(),
            }),
            None => skipped_no_mapping += 1,
        }
    }

    let touched: HashSet<(u64, NaiveDate)> = grouping::group_punches(resolved_new, schedules, cfg)
        .into_keys()
        .collect();

    let resolved_history: Vec<ResolvedPunch> = history
        .iter()
        .filter_map(|event| {
            let key = (event.device_id.clone(), event.device_user_code.clone());
            mappings.get(&key).map(|&employee_id| ResolvedPunch {
                employee_id,
                event: event.clone(),
            })
        })
        .collect();

    let mut buckets = Vec::new();
    let mut skipped_adjusted = 0;
    let mut pending_buckets = 0;

    for ((employee_id, day), punches) in grouping::group_punches(resolved_history, schedules, cfg)
    {
        // Only days the new events touched are re-derived.
        if !touched.contains(&(employee_id, day)) {
            continue;
        }
        // Adjustment Guard: a manually corrected day is never recomputed.
        if adjusted.contains(&(employee_id, day)) {
            skipped_adjusted += 1;
            continue;
        }

        let day_schedules = DaySchedules {
            today: schedules.get(&(employee_id, day)),
            next: schedules.get(&(employee_id, day + Duration::days(1))),
        };
        match reconcile_day(employee_id, day, &punches, day_schedules, now, cfg) {
            Reconciled::Record { record, audits } => buckets.push((record, audits)),
            Reconciled::Pending => pending_buckets += 1,
        }
    }

    BatchPlan {
        buckets,
        next_watermark,
        events_seen,
        skipped_no_mapping,
        skipped_adjusted,
        pending_buckets,
    }
}

/// Drain everything past the durable watermark.
///
/// The watermark is advanced only after a batch's records are persisted, so
/// a crash anywhere in the loop re-runs the same batch; every write is
/// idempotently keyed, so the replay converges to the same state. Callers
/// must ensure at most one instance of this loop runs at a time.
pub async fn run_batch_loop(pool: &MySqlPool, cfg: &EngineConfig) -> Result<RunSummary> {
    let run_id = Uuid::new_v4();
    let mut summary = RunSummary::default();
    let mut watermark = store::load_watermark(pool).await?;
    info!(%run_id, watermark, "reconciliation run starting");

    loop {
        info!(%run_id, phase = %BatchPhase::Fetching, watermark, "fetching punch events");
        let events = store::fetch_events_after(pool, watermark, cfg.batch_size).await?;
        if events.is_empty() {
            info!(%run_id, phase = %BatchPhase::Done, watermark, "no events left");
            break;
        }

        info!(%run_id, phase = %BatchPhase::Processing, events = events.len(), "planning batch");
        let plan = plan_from_events(pool, watermark, &events, cfg).await?;

        info!(
            %run_id,
            phase = %BatchPhase::Persisting,
            records = plan.buckets.len(),
            skipped_no_mapping = plan.skipped_no_mapping,
            skipped_adjusted = plan.skipped_adjusted,
            "persisting batch"
        );
        persist_plan(pool, &plan, &mut summary).await?;

        // Watermark moves only after the whole batch is durable.
        store::save_watermark(pool, plan.next_watermark).await?;
        watermark = plan.next_watermark;
        summary.batches += 1;
    }

    summary.final_watermark = watermark;
    info!(%run_id, ?summary, "reconciliation run finished");
    Ok(summary)
}

/// Targeted re-run over an explicit device/user scope and/or time range.
/// Uses a local epoch cursor; the durable watermark is never read as a
/// bound nor written.
pub async fn run_backfill(
    pool: &MySqlPool,
    cfg: &EngineConfig,
    pairs: &[DeviceKey],
    from: Option<NaiveDateTime>,
    to: Option<NaiveDateTime>,
) -> Result<RunSummary> {
    let run_id = Uuid::new_v4();
    let mut summary = RunSummary::default();
    let mut cursor = 0i64;
    info!(%run_id, pairs = pairs.len(), ?from, ?to, "backfill starting");

    loop {
        let events =
            store::fetch_events_scoped(pool, pairs, from, to, cursor, cfg.batch_size).await?;
        if events.is_empty() {
            break;
        }

        let plan = plan_from_events(pool, cursor, &events, cfg).await?;
        persist_plan(pool, &plan, &mut summary).await?;
        cursor = plan.next_watermark;
        summary.batches += 1;
    }

    summary.final_watermark = store::load_watermark(pool).await?;
    info!(%run_id, ?summary, "backfill finished");
    Ok(summary)
}

/// Fetch the batch's mapping/schedule/adjustment context plus the full
/// punch history for the batch's scope, then plan it.
async fn plan_from_events(
    pool: &MySqlPool,
    watermark: i64,
    events: &[PunchEvent],
    cfg: &EngineConfig,
) -> Result<BatchPlan> {
    let mut mappings = resolve_mappings(pool, events).await?;
    let employee_ids: Vec<u64> = mappings
        .values()
        .copied()
        .collect::<HashSet<_>>()
        .into_iter()
        .collect();

    // Work-day span of the batch, widened one day each way: the previous
    // day for overnight fallback, the next day for the cutoff cap.
    let mut span: Option<(NaiveDate, NaiveDate)> = None;
    for event in events {
        let day = local_day(event.occurred_at, cfg.offset());
        span = Some(match span {
            None => (day, day),
            Some((lo, hi)) => (lo.min(day), hi.max(day)),
        });
    }

    let (schedules, adjusted, history) = match span {
        Some((lo, hi)) if !employee_ids.is_empty() => {
            let from = lo - Duration::days(1);
            let to = hi + Duration::days(1);

            // The touched employees' entire device footprint, so earlier
            // punches on other devices still pair up.
            for m in store::fetch_mappings_for_employees(pool, &employee_ids).await? {
                mappings.insert((m.device_id, m.device_user_code), m.employee_id);
            }
            let pairs: Vec<DeviceKey> = mappings.keys().cloned().collect();

            let to_utc = Duration::seconds(cfg.offset().local_minus_utc() as i64);
            let history_from = from.and_time(NaiveTime::MIN) - to_utc;
            let history_to = (to + Duration::days(1)).and_time(NaiveTime::MIN) - to_utc;

            (
                store::fetch_schedules(pool, &employee_ids, from, to).await?,
                store::load_adjusted_keys(pool, &employee_ids, from, to).await?,
                store::fetch_events_for_pairs(pool, &pairs, history_from, history_to).await?,
            )
        }
        _ => (HashMap::new(), HashSet::new(), Vec::new()),
    };

    Ok(plan_batch(
        watermark,
        events,
        &history,
        &mappings,
        &schedules,
        &adjusted,
        Utc::now().naive_utc(),
        cfg,
    ))
}

/// Resolve the batch's distinct device keys to employees: cuckoo prefilter
/// first, then the moka cache, then the database. Keys that resolve to
/// nothing are simply absent from the result.
async fn resolve_mappings(
    pool: &MySqlPool,
    events: &[PunchEvent],
) -> Result<HashMap<DeviceKey, u64>> {
    let keys: HashSet<DeviceKey> = events
        .iter()
        .map(|e| (e.device_id.clone(), e.device_user_code.clone()))
        .collect();

    let mut mappings = HashMap::with_capacity(keys.len());
    for (device_id, code) in keys {
        if !mapping_filter::might_exist(&device_id, &code) {
            continue;
        }
        if let Some(employee_id) = mapping_cache::get(&device_id, &code).await {
            mappings.insert((device_id, code), employee_id);
            continue;
        }
        if let Some(mapping) = store::find_active_mapping(pool, &device_id, &code).await? {
            mapping_cache::put(&device_id, &code, mapping.employee_id).await;
            mapping_filter::insert(&device_id, &code);
            mappings.insert((device_id, code), mapping.employee_id);
        }
    }
    Ok(mappings)
}

async fn persist_plan(
    pool: &MySqlPool,
    plan: &BatchPlan,
    summary: &mut RunSummary,
) -> Result<()> {
    for (record, audits) in &plan.buckets {
        store::persist_bucket(pool, record, audits).await?;
    }
    summary.events_seen += plan.events_seen;
    summary.skipped_no_mapping += plan.skipped_no_mapping;
    summary.skipped_adjusted += plan.skipped_adjusted;
    summary.pending_buckets += plan.pending_buckets;
    summary.records_written += plan.buckets.len() as u64;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::attendance::DayStatus;
    use chrono::{NaiveDate, NaiveTime};

    fn d(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 3, day).unwrap()
    }

    fn at(day: u32, h: u32, min: u32) -> NaiveDateTime {
        d(day).and_time(NaiveTime::from_hms_opt(h, min, 0).unwrap())
    }

    fn punch(epoch: i64, code: &str, day: u32, h: u32, min: u32) -> PunchEvent {
        PunchEvent {
            id: epoch as u64,
            device_id: "dev-1".into(),
            device_user_code: code.into(),
            occurred_at: at(day, h, min),
            epoch,
        }
    }

    fn mapping(code: &str, employee_id: u64) -> (DeviceKey, u64) {
        (("dev-1".into(), code.into()), employee_id)
    }

    fn day_shift(employee_id: u64, day: u32) -> ((u64, NaiveDate), ShiftSchedule) {
        (
            (employee_id, d(day)),
            ShiftSchedule {
                id: 0,
                employee_id,
                work_date: d(day),
                start_time: NaiveTime::from_hms_opt(8, 0, 0).unwrap(),
                end_time: NaiveTime::from_hms_opt(17, 0, 0).unwrap(),
                break_minutes: 0,
                late_grace_minutes: 10,
                early_grace_minutes: 10,
            },
        )
    }

    #[test]
    fn watermark_advances_to_max_epoch_seen() {
        let events = [punch(11, "101", 2, 8, 0), punch(15, "999", 2, 9, 0)];
        let mappings = HashMap::from([mapping("101", 7)]);
        let plan = plan_batch(
            10,
            &events,
            &events,
            &mappings,
            &HashMap::new(),
            &HashSet::new(),
            at(2, 23, 0),
            &EngineConfig::default(),
        );
        // The unmapped event still moves the watermark.
        assert_eq!(plan.next_watermark, 15);
        assert_eq!(plan.events_seen, 2);
        assert_eq!(plan.skipped_no_mapping, 1);
    }

    #[test]
    fn events_at_or_below_watermark_are_ignored() {
        let events = [punch(9, "101", 2, 8, 0), punch(10, "101", 2, 9, 0)];
        let mappings = HashMap::from([mapping("101", 7)]);
        let plan = plan_batch(
            10,
            &events,
            &events,
            &mappings,
            &HashMap::new(),
            &HashSet::new(),
            at(2, 23, 0),
            &EngineConfig::default(),
        );
        assert_eq!(plan.events_seen, 0);
        assert_eq!(plan.next_watermark, 10);
        assert!(plan.buckets.is_empty());
    }

    #[test]
    fn planning_is_idempotent() {
        let events = [punch(11, "101", 2, 8, 0), punch(12, "101", 2, 17, 0)];
        let mappings = HashMap::from([mapping("101", 7)]);
        let schedules = HashMap::from([day_shift(7, 2)]);
        let cfg = EngineConfig::default();
        let now = at(2, 23, 0);

        let a = plan_batch(0, &events, &events, &mappings, &schedules, &HashSet::new(), now, &cfg);
        let b = plan_batch(0, &events, &events, &mappings, &schedules, &HashSet::new(), now, &cfg);
        assert_eq!(a, b);
        assert_eq!(a.buckets.len(), 1);
        assert_eq!(a.buckets[0].0.status, DayStatus::Present);
    }

    #[test]
    fn replay_from_old_watermark_rebuilds_identical_records() {
        // Crash-after-persist simulation: the batch persisted but the
        // watermark never advanced. Re-planning from the stale watermark
        // must produce the exact same records, which the keyed upserts
        // then absorb as no-ops.
        let events = [punch(11, "101", 2, 8, 0), punch(12, "101", 2, 17, 0)];
        let mappings = HashMap::from([mapping("101", 7)]);
        let schedules = HashMap::from([day_shift(7, 2)]);
        let cfg = EngineConfig::default();
        let now = at(2, 23, 0);

        let first = plan_batch(0, &events, &events, &mappings, &schedules, &HashSet::new(), now, &cfg);
        let replay = plan_batch(0, &events, &events, &mappings, &schedules, &HashSet::new(), now, &cfg);
        assert_eq!(first.buckets, replay.buckets);

        // And once the watermark did advance, the same events plan to
        // nothing at all.
        let after =
            plan_batch(first.next_watermark, &events, &events, &mappings, &schedules, &HashSet::new(), now, &cfg);
        assert!(after.buckets.is_empty());
        assert_eq!(after.events_seen, 0);
    }

    #[test]
    fn adjusted_days_are_never_recomputed() {
        let events = [punch(11, "101", 2, 8, 0), punch(12, "101", 2, 17, 0)];
        let mappings = HashMap::from([mapping("101", 7)]);
        let schedules = HashMap::from([day_shift(7, 2)]);
        let adjusted = HashSet::from([(7u64, d(2))]);
        let plan = plan_batch(
            0,
            &events,
            &events,
            &mappings,
            &schedules,
            &adjusted,
            at(2, 23, 0),
            &EngineConfig::default(),
        );
        assert!(plan.buckets.is_empty());
        assert_eq!(plan.skipped_adjusted, 1);
        // Progress still moves; the day simply stays as the human left it.
        assert_eq!(plan.next_watermark, 12);
    }

    #[test]
    fn insufficient_buckets_are_counted_pending() {
        // One too-early punch, window still open: nothing written yet.
        let events = [punch(11, "101", 2, 5, 0)];
        let mappings = HashMap::from([mapping("101", 7)]);
        let schedules = HashMap::from([day_shift(7, 2)]);
        let plan = plan_batch(
            0,
            &events,
            &events,
            &mappings,
            &schedules,
            &HashSet::new(),
            at(2, 6, 0),
            &EngineConfig::default(),
        );
        assert!(plan.buckets.is_empty());
        assert_eq!(plan.pending_buckets, 1);
    }

    #[test]
    fn split_batches_converge_to_the_single_batch_record() {
        // Morning run sees the check-in, evening run sees the check-out.
        // The evening batch must re-derive the day from its full punch
        // history, not from the new slice alone.
        let events = [punch(11, "101", 2, 8, 0), punch(12, "101", 2, 17, 0)];
        let mappings = HashMap::from([mapping("101", 7)]);
        let schedules = HashMap::from([day_shift(7, 2)]);
        let cfg = EngineConfig::default();
        let now = at(2, 23, 0);

        let single =
            plan_batch(0, &events, &events, &mappings, &schedules, &HashSet::new(), now, &cfg);

        let morning =
            plan_batch(0, &events[..1], &events[..1], &mappings, &schedules, &HashSet::new(), now, &cfg);
        let evening = plan_batch(
            morning.next_watermark,
            &events[1..],
            &events,
            &mappings,
            &schedules,
            &HashSet::new(),
            now,
            &cfg,
        );

        assert_eq!(evening.buckets, single.buckets);
        let record = &evening.buckets[0].0;
        assert_eq!(record.check_in_at, Some(at(2, 8, 0)));
        assert_eq!(record.check_out_at, Some(at(2, 17, 0)));
        assert_eq!(record.late_minutes, 0);
        assert_eq!(record.status, DayStatus::Present);
    }

    #[test]
    fn late_arriving_stray_punch_resolves_with_full_history() {
        // A complete day was already derived; a stray punch past the
        // check-in window arrives in a later batch. With the full history
        // in view the day keeps its check-in instead of flipping to absent.
        let events = [
            punch(11, "101", 2, 8, 0),
            punch(12, "101", 2, 17, 0),
            punch(13, "101", 2, 22, 30),
        ];
        let mappings = HashMap::from([mapping("101", 7)]);
        let schedules = HashMap::from([day_shift(7, 2)]);
        let plan = plan_batch(
            12,
            &events[2..],
            &events,
            &mappings,
            &schedules,
            &HashSet::new(),
            at(2, 23, 0),
            &EngineConfig::default(),
        );

        assert_eq!(plan.buckets.len(), 1);
        let record = &plan.buckets[0].0;
        assert_ne!(record.status, DayStatus::Absent);
        assert_eq!(record.check_in_at, Some(at(2, 8, 0)));
        // The stray punch is real data: it extends the checkout.
        assert_eq!(record.check_out_at, Some(at(2, 22, 30)));
    }

    #[test]
    fn history_days_untouched_by_new_events_are_left_alone() {
        // Day 2 is already settled; a day-3 event must not rewrite it.
        let events = [
            punch(11, "101", 2, 8, 0),
            punch(12, "101", 2, 17, 0),
            punch(13, "101", 3, 8, 0),
        ];
        let mappings = HashMap::from([mapping("101", 7)]);
        let schedules = HashMap::from([day_shift(7, 2), day_shift(7, 3)]);
        let plan = plan_batch(
            12,
            &events[2..],
            &events,
            &mappings,
            &schedules,
            &HashSet::new(),
            at(3, 9, 0),
            &EngineConfig::default(),
        );

        let days: Vec<NaiveDate> = plan.buckets.iter().map(|(r, _)| r.work_date).collect();
        assert_eq!(days, vec![d(3)]);
    }

    #[test]
    fn phases_render_as_screaming_snake_case() {
        assert_eq!(BatchPhase::Fetching.to_string(), "FETCHING");
        assert_eq!(BatchPhase::Done.to_string(), "DONE");
    }
}
