use std::collections::HashMap;

use anyhow::Result;
use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::Deserialize;
use tracing::{debug, info};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_database::SupabaseClient;

use crate::models::{
    Appointment, AvailabilityDecision, BookingSearchParams, Location, Therapist, TherapyService,
};
use crate::services::cache::{AvailabilityCache, AvailabilityCacheKey};
use crate::services::evaluator::{self, EvaluationContext};
use crate::services::locations::{LocationGroup, LocationGroupResolver};

/// One eager-loaded read: schedule with its weekly/adjusted windows plus the
/// active address and its location, so the evaluation loop never goes back to
/// the store per therapist.
pub const CANDIDATE_SELECT: &str = "select=*,schedule:schedules(*,weekly_availabilities(*),adjusted_availabilities(*)),address:therapist_addresses(*,location:locations(*))";

/// Filters and evaluates a fleet of therapists against one booking request.
pub struct FleetQueryService {
    supabase: SupabaseClient,
    resolver: LocationGroupResolver,
    cache: Option<AvailabilityCache>,
    batch_size: usize,
    progress_threshold: usize,
}

impl FleetQueryService {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            supabase: SupabaseClient::new(config),
            resolver: LocationGroupResolver::new(config),
            cache: None,
            batch_size: config.fleet_batch_size.max(1),
            progress_threshold: config.fleet_progress_threshold,
        }
    }

    pub fn with_cache(mut self, cache: AvailabilityCache) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Load, filter and (when a candidate time is present) evaluate every
    /// matching therapist, mapping the keepers through `formatter`. Without a
    /// candidate time this is plain listing mode: every filtered therapist is
    /// formatted with no decision attached.
    pub async fn filtered_therapists<T, F>(
        &self,
        location: &Location,
        service: &TherapyService,
        params: &BookingSearchParams,
        exclude_appointment_id: Option<Uuid>,
        auth_token: Option<&str>,
        formatter: F,
    ) -> Result<Vec<T>>
    where
        F: Fn(&Therapist, Option<&AvailabilityDecision>) -> T,
    {
        debug!(
            "Filtering therapists for service {} at {}",
            service.name, location.name
        );

        let group = self.resolver.resolve(location, auth_token).await?;
        let candidates = self
            .load_candidates(&group, params, auth_token, None)
            .await?;

        let mut memo = HashMap::new();
        self.process_candidates(
            candidates,
            &group,
            params,
            exclude_appointment_id,
            auth_token,
            &formatter,
            &mut memo,
        )
        .await
    }

    /// Identical contract and results to `filtered_therapists`, but candidate
    /// ids are paged in fixed-size chunks and each page is hydrated and
    /// evaluated independently, bounding the working set per call.
    pub async fn filtered_therapists_in_batches<T, F>(
        &self,
        location: &Location,
        service: &TherapyService,
        params: &BookingSearchParams,
        exclude_appointment_id: Option<Uuid>,
        auth_token: Option<&str>,
        formatter: F,
    ) -> Result<Vec<T>>
    where
        F: Fn(&Therapist, Option<&AvailabilityDecision>) -> T,
    {
        debug!(
            "Batch-filtering therapists for service {} at {}",
            service.name, location.name
        );

        let group = self.resolver.resolve(location, auth_token).await?;
        let candidate_ids = self.load_candidate_ids(&group, params, auth_token).await?;
        let total = candidate_ids.len();

        let mut results = Vec::new();
        let mut memo = HashMap::new();
        let mut processed = 0usize;

        for chunk in candidate_ids.chunks(self.batch_size) {
            let candidates = self
                .load_candidates(&group, params, auth_token, Some(chunk))
                .await?;
            let page = self
                .process_candidates(
                    candidates,
                    &group,
                    params,
                    exclude_appointment_id,
                    auth_token,
                    &formatter,
                    &mut memo,
                )
                .await?;
            results.extend(page);

            processed += chunk.len();
            if total > self.progress_threshold {
                info!("Processed {}/{} candidate therapists", processed, total);
            }
        }

        Ok(results)
    }

    /// Load one therapist with schedule and same-day appointments and
    /// enumerate the free start times for `date`.
    pub async fn available_slots_for_date(
        &self,
        therapist_id: Uuid,
        date: NaiveDate,
        auth_token: Option<&str>,
    ) -> Result<Vec<String>> {
        let path = format!(
            "/rest/v1/therapists?{}&id=eq.{}",
            CANDIDATE_SELECT, therapist_id
        );
        let rows: Vec<Therapist> = self.supabase.fetch_rows_lenient(&path, auth_token).await?;
        let Some(therapist) = rows.into_iter().next() else {
            return Ok(Vec::new());
        };

        let window = padded_day_window(date);
        let grouped = self
            .load_day_appointments(&[therapist.id], window, None, auth_token)
            .await?;
        let appointments = grouped.get(&therapist.id).cloned().unwrap_or_default();

        Ok(evaluator::available_slots_for_date(
            &therapist,
            date,
            &appointments,
        ))
    }

    #[allow(clippy::too_many_arguments)]
    async fn process_candidates<T, F>(
        &self,
        candidates: Vec<Therapist>,
        group: &LocationGroup,
        params: &BookingSearchParams,
        exclude_appointment_id: Option<Uuid>,
        auth_token: Option<&str>,
        formatter: &F,
        memo: &mut HashMap<String, AvailabilityDecision>,
    ) -> Result<Vec<T>>
    where
        F: Fn(&Therapist, Option<&AvailabilityDecision>) -> T,
    {
        let retained: Vec<Therapist> = candidates
            .into_iter()
            .filter(|therapist| passes_location_rule(therapist, group))
            .filter(|therapist| passes_gender_filter(therapist, params))
            .collect();

        let Some(candidate_time) = params.appointment_date_time else {
            return Ok(retained
                .iter()
                .map(|therapist| formatter(therapist, None))
                .collect());
        };

        let ids: Vec<Uuid> = retained.iter().map(|therapist| therapist.id).collect();
        let window = padded_day_window(candidate_time.date_naive());
        let appointments = self
            .load_day_appointments(&ids, window, exclude_appointment_id, auth_token)
            .await?;

        let now = Utc::now();
        let none: Vec<Appointment> = Vec::new();
        let mut kept = Vec::new();
        for therapist in &retained {
            let same_day = appointments.get(&therapist.id).unwrap_or(&none);
            let decision = self
                .evaluate_memoized(
                    therapist,
                    candidate_time,
                    params.all_of_day,
                    exclude_appointment_id,
                    same_day,
                    now,
                    memo,
                )
                .await;
            if decision.available {
                kept.push(formatter(therapist, Some(&decision)));
            }
        }

        Ok(kept)
    }

    /// Consults the per-invocation memo map first, then the shared cache when
    /// configured, and only then recomputes. Cache failures are already
    /// downgraded to misses inside `AvailabilityCache`.
    #[allow(clippy::too_many_arguments)]
    async fn evaluate_memoized(
        &self,
        therapist: &Therapist,
        candidate_time: DateTime<Utc>,
        all_of_day: bool,
        exclude_appointment_id: Option<Uuid>,
        same_day_appointments: &[Appointment],
        now: DateTime<Utc>,
        memo: &mut HashMap<String, AvailabilityDecision>,
    ) -> AvailabilityDecision {
        let key = AvailabilityCacheKey {
            therapist_id: therapist.id,
            candidate_time,
            all_of_day,
            exclude_appointment_id,
        };
        let memo_key = key.redis_key();

        if let Some(hit) = memo.get(&memo_key) {
            return hit.clone();
        }
        if let Some(cache) = &self.cache {
            if let Some(hit) = cache.get_cached_availability(&key).await {
                memo.insert(memo_key, hit.clone());
                return hit;
            }
        }

        let ctx = EvaluationContext {
            now,
            same_day_appointments,
            exclude_appointment_id,
            all_of_day,
        };
        let decision = evaluator::evaluate(therapist, candidate_time, &ctx);

        if let Some(cache) = &self.cache {
            cache.cache_availability(&key, &decision).await;
        }
        memo.insert(memo_key, decision.clone());
        decision
    }

    fn candidate_filters(&self, group: &LocationGroup, params: &BookingSearchParams) -> Vec<String> {
        let mut filters = vec!["employment_status=eq.ACTIVE".to_string()];

        match params.employment_type {
            Some(employment_type) => filters.push(format!(
                "employment_type=eq.{}",
                employment_type.as_query_value()
            )),
            None => filters.push(
                "or=(employment_type.eq.FLAT,and(latitude.neq.0,longitude.neq.0))".to_string(),
            ),
        }

        let quoted: Vec<String> = group
            .names()
            .iter()
            .map(|name| format!("\"{}\"", name))
            .collect();
        filters.push(format!(
            "or=(location_rule.is.null,location_rule.eq.{{}},location_rule.ov.{{{}}})",
            quoted.join(",")
        ));

        filters
    }

    async fn load_candidates(
        &self,
        group: &LocationGroup,
        params: &BookingSearchParams,
        auth_token: Option<&str>,
        ids: Option<&[Uuid]>,
    ) -> Result<Vec<Therapist>> {
        let mut path = format!(
            "/rest/v1/therapists?{}&{}",
            CANDIDATE_SELECT,
            self.candidate_filters(group, params).join("&")
        );
        if let Some(ids) = ids {
            path.push_str(&format!("&id=in.({})", join_ids(ids)));
        }
        path.push_str("&order=id.asc");

        self.supabase.fetch_rows_lenient(&path, auth_token).await
    }

    async fn load_candidate_ids(
        &self,
        group: &LocationGroup,
        params: &BookingSearchParams,
        auth_token: Option<&str>,
    ) -> Result<Vec<Uuid>> {
        #[derive(Deserialize)]
        struct IdRow {
            id: Uuid,
        }

        let path = format!(
            "/rest/v1/therapists?select=id&{}&order=id.asc",
            self.candidate_filters(group, params).join("&")
        );
        let rows: Vec<IdRow> = self.supabase.fetch_rows_lenient(&path, auth_token).await?;
        Ok(rows.into_iter().map(|row| row.id).collect())
    }

    /// One grouped read of every candidate's appointments around the target
    /// day. Cancelled/unscheduled appointments and the excluded id are
    /// filtered store-side; the evaluator narrows to each schedule's local
    /// calendar day.
    async fn load_day_appointments(
        &self,
        therapist_ids: &[Uuid],
        window: (DateTime<Utc>, DateTime<Utc>),
        exclude_appointment_id: Option<Uuid>,
        auth_token: Option<&str>,
    ) -> Result<HashMap<Uuid, Vec<Appointment>>> {
        if therapist_ids.is_empty() {
            return Ok(HashMap::new());
        }

        let mut path = format!(
            "/rest/v1/appointments?therapist_id=in.({})&appointment_date_time=gte.{}&appointment_date_time=lt.{}&status=not.in.(cancelled,unscheduled)&order=appointment_date_time.asc",
            join_ids(therapist_ids),
            format_query_time(window.0),
            format_query_time(window.1),
        );
        if let Some(excluded) = exclude_appointment_id {
            path.push_str(&format!("&id=neq.{}", excluded));
        }

        let rows: Vec<Appointment> = self.supabase.fetch_rows_lenient(&path, auth_token).await?;

        let mut grouped: HashMap<Uuid, Vec<Appointment>> = HashMap::new();
        for appointment in rows {
            grouped
                .entry(appointment.therapist_id)
                .or_default()
                .push(appointment);
        }
        Ok(grouped)
    }
}

fn passes_location_rule(therapist: &Therapist, group: &LocationGroup) -> bool {
    if therapist.is_unrestricted() {
        return true;
    }
    let rule = therapist
        .location_rule
        .as_deref()
        .unwrap_or_default();

    // Hub exception: a rule naming the state's hub city is eligible for any
    // location in the group.
    rule.iter().any(|name| {
        group.contains_name(name)
            || group
                .hub_name()
                .is_some_and(|hub| hub.eq_ignore_ascii_case(name))
    })
}

fn passes_gender_filter(therapist: &Therapist, params: &BookingSearchParams) -> bool {
    match params.gender_filter() {
        Some(gender) => therapist.gender.eq_ignore_ascii_case(gender),
        None => true,
    }
}

/// UTC window padded a day on each side so the local calendar day of any
/// schedule timezone is fully covered.
fn padded_day_window(date: NaiveDate) -> (DateTime<Utc>, DateTime<Utc>) {
    let start = (date - Duration::days(1))
        .and_hms_opt(0, 0, 0)
        .map(|dt| dt.and_utc())
        .unwrap_or_else(Utc::now);
    let end = (date + Duration::days(2))
        .and_hms_opt(0, 0, 0)
        .map(|dt| dt.and_utc())
        .unwrap_or_else(Utc::now);
    (start, end)
}

fn join_ids(ids: &[Uuid]) -> String {
    ids.iter()
        .map(|id| id.to_string())
        .collect::<Vec<_>>()
        .join(",")
}

fn format_query_time(time: DateTime<Utc>) -> String {
    // "Z"-suffixed so the query string stays free of '+' characters.
    time.format("%Y-%m-%dT%H:%M:%SZ").to_string()
}
