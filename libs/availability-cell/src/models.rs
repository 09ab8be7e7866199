use chrono::{DateTime, NaiveDate, NaiveTime, Utc, Weekday};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Sentinel gender preference that disables the gender filter.
pub const NO_GENDER_PREFERENCE: &str = "NO PREFERENCE";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EmploymentType {
    Flat,
    Mobile,
}

impl EmploymentType {
    pub fn as_query_value(&self) -> &'static str {
        match self {
            EmploymentType::Flat => "FLAT",
            EmploymentType::Mobile => "MOBILE",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EmploymentStatus {
    Active,
    Inactive,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AppointmentStatus {
    Pending,
    Confirmed,
    Completed,
    Cancelled,
    Unscheduled,
    #[serde(other)]
    Other,
}

impl AppointmentStatus {
    /// Cancelled and unscheduled appointments never block a therapist.
    pub fn counts_toward_availability(&self) -> bool {
        !matches!(
            self,
            AppointmentStatus::Cancelled | AppointmentStatus::Unscheduled
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Location {
    pub id: Uuid,
    pub name: String,
    pub state: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TherapistAddress {
    pub id: Uuid,
    pub street: Option<String>,
    #[serde(default = "default_active")]
    pub active: bool,
    pub location: Option<Location>,
}

fn default_active() -> bool {
    true
}

/// Recurring weekly window. `day_of_week` uses 0 = Sunday .. 6 = Saturday.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WeeklyAvailability {
    pub id: Uuid,
    pub day_of_week: i64,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
}

/// One-off override for a single date. A missing start or end time means the
/// therapist is fully unavailable that date; timed entries replace the weekly
/// windows for that date only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdjustedAvailability {
    pub id: Uuid,
    pub date: NaiveDate,
    pub start_time: Option<NaiveTime>,
    pub end_time: Option<NaiveTime>,
    pub reason: Option<String>,
}

impl AdjustedAvailability {
    pub fn blocks_whole_day(&self) -> bool {
        self.start_time.is_none() || self.end_time.is_none()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Schedule {
    pub id: Uuid,
    pub therapist_id: Uuid,
    pub appointment_duration_minutes: i64,
    pub buffer_minutes: i64,
    /// IANA timezone name; all weekday and date-window arithmetic happens in
    /// this zone, never the caller's.
    pub timezone: String,
    #[serde(default)]
    pub available_now: bool,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub max_advance_booking_days: Option<i64>,
    #[serde(default)]
    pub min_booking_before_hours: i64,
    pub max_daily_appointments: Option<i64>,
    #[serde(default)]
    pub weekly_availabilities: Vec<WeeklyAvailability>,
    #[serde(default)]
    pub adjusted_availabilities: Vec<AdjustedAvailability>,
}

impl Schedule {
    pub fn tz(&self) -> Option<Tz> {
        self.timezone.parse().ok()
    }

    pub fn weekly_windows_for(&self, weekday: Weekday) -> Vec<&WeeklyAvailability> {
        let index = weekday_index(weekday);
        self.weekly_availabilities
            .iter()
            .filter(|window| window.day_of_week == index)
            .collect()
    }

    pub fn adjusted_for(&self, date: NaiveDate) -> Vec<&AdjustedAvailability> {
        self.adjusted_availabilities
            .iter()
            .filter(|entry| entry.date == date)
            .collect()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Therapist {
    pub id: Uuid,
    pub first_name: String,
    pub last_name: String,
    pub gender: String,
    pub employment_type: EmploymentType,
    pub employment_status: EmploymentStatus,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    /// Names of locations this therapist restricts themselves to.
    /// `None` or empty means unrestricted.
    pub location_rule: Option<Vec<String>>,
    pub schedule: Option<Schedule>,
    pub address: Option<TherapistAddress>,
}

impl Therapist {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }

    pub fn location_name(&self) -> Option<&str> {
        self.address
            .as_ref()?
            .location
            .as_ref()
            .map(|location| location.name.as_str())
    }

    pub fn is_unrestricted(&self) -> bool {
        self.location_rule
            .as_ref()
            .map(|rule| rule.is_empty())
            .unwrap_or(true)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Appointment {
    pub id: Uuid,
    pub therapist_id: Uuid,
    pub appointment_date_time: DateTime<Utc>,
    pub duration_minutes: Option<i64>,
    pub status: AppointmentStatus,
    pub location_name: Option<String>,
}

impl Appointment {
    /// Appointments may carry their own duration; otherwise the schedule's
    /// configured duration applies.
    pub fn effective_duration_minutes(&self, schedule: &Schedule) -> i64 {
        self.duration_minutes
            .unwrap_or(schedule.appointment_duration_minutes)
    }
}

/// Request context only; the engine does not interpret the service further.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TherapyService {
    pub id: Uuid,
    pub name: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BookingSearchParams {
    pub appointment_date_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub all_of_day: bool,
    pub employment_type: Option<EmploymentType>,
    pub preferred_therapist_gender: Option<String>,
}

impl BookingSearchParams {
    pub fn gender_filter(&self) -> Option<&str> {
        match self.preferred_therapist_gender.as_deref() {
            Some(gender) if !gender.eq_ignore_ascii_case(NO_GENDER_PREFERENCE) => Some(gender),
            _ => None,
        }
    }
}

/// Tagged reason a candidate time was rejected. String rendering happens only
/// at the presentation boundary via `Display`.
#[derive(Debug, Clone, PartialEq, Error, Serialize, Deserialize)]
pub enum UnavailableReason {
    #[error("Not available for past dates")]
    PastDate,
    #[error("Not available within {min_hours} hours from now")]
    TooSoon { min_hours: i64 },
    #[error("Exceeds the maximum advance booking of {max_days} days")]
    ExceedsAdvanceBooking { max_days: i64 },
    #[error("Not available before schedule start date {start_date}")]
    BeforeScheduleStart { start_date: NaiveDate },
    #[error("Not available after schedule end date {end_date}")]
    AfterScheduleEnd { end_date: NaiveDate },
    #[error("No weekly slots for {weekday}")]
    NoWeeklySlots { weekday: String },
    #[error("Unavailable on {date}")]
    UnavailableOnDate { date: NaiveDate },
    #[error("Outside weekly availability for {weekday}")]
    OutsideWeeklyHours { weekday: String },
    #[error("Outside adjusted availability hours on {date}")]
    OutsideAdjustedHours { date: NaiveDate },
    #[error("Conflicts with appointment {appointment_id}")]
    Conflict { appointment_id: Uuid },
    #[error("Has reached max daily appointments ({max})")]
    DailyCapReached { max: i64 },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AvailabilityDecision {
    pub available: bool,
    #[serde(default)]
    pub reasons: Vec<UnavailableReason>,
}

impl AvailabilityDecision {
    pub fn bookable() -> Self {
        Self {
            available: true,
            reasons: Vec::new(),
        }
    }

    pub fn blocked(reason: UnavailableReason) -> Self {
        Self {
            available: false,
            reasons: vec![reason],
        }
    }

    /// Unavailable without a reason text, e.g. no schedule configured.
    pub fn blocked_without_reason() -> Self {
        Self {
            available: false,
            reasons: Vec::new(),
        }
    }

    pub fn reason_strings(&self) -> Vec<String> {
        self.reasons.iter().map(ToString::to_string).collect()
    }
}

/// Default caller-shaped record produced by the fleet query; callers may
/// supply any other formatter closure instead.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AvailableTherapist {
    pub therapist_id: Uuid,
    pub full_name: String,
    pub gender: String,
    pub location: Option<String>,
    pub available: bool,
    pub reasons: Vec<String>,
}

impl AvailableTherapist {
    pub fn from_evaluation(therapist: &Therapist, decision: Option<&AvailabilityDecision>) -> Self {
        Self {
            therapist_id: therapist.id,
            full_name: therapist.full_name(),
            gender: therapist.gender.clone(),
            location: therapist.location_name().map(String::from),
            available: decision.map(|d| d.available).unwrap_or(true),
            reasons: decision.map(|d| d.reason_strings()).unwrap_or_default(),
        }
    }
}

pub fn weekday_index(weekday: Weekday) -> i64 {
    weekday.num_days_from_sunday() as i64
}

pub fn weekday_name(weekday: Weekday) -> &'static str {
    match weekday {
        Weekday::Sun => "Sunday",
        Weekday::Mon => "Monday",
        Weekday::Tue => "Tuesday",
        Weekday::Wed => "Wednesday",
        Weekday::Thu => "Thursday",
        Weekday::Fri => "Friday",
        Weekday::Sat => "Saturday",
    }
}
