//! Accrual requests: a customer's claim for miles on one flown ticket.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Review state of an accrual request.
///
/// `InProgress` is the only non-terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestStatus {
    InProgress,
    Approved,
    Rejected,
}

impl RequestStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestStatus::InProgress => "in_progress",
            RequestStatus::Approved => "approved",
            RequestStatus::Rejected => "rejected",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, RequestStatus::InProgress)
    }
}

impl fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RequestStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "in_progress" => Ok(RequestStatus::InProgress),
            "approved" => Ok(RequestStatus::Approved),
            "rejected" => Ok(RequestStatus::Rejected),
            other => Err(format!("unknown request status: {}", other)),
        }
    }
}

/// Ticket evidence submitted by a customer.
#[derive(Debug, Clone, PartialEq)]
pub struct TicketClaim {
    pub ticket_id: String,
    pub pnr: String,
    pub carrier: String,
    pub booking_class: String,
    pub from_code: String,
    pub to_code: String,
    pub departure_date: NaiveDate,
    pub ticket_image_url: Option<String>,
    pub boarding_pass_image_url: Option<String>,
}

/// Who reviewed a request, when, and why it was turned down.
#[derive(Debug, Clone, PartialEq)]
pub struct Review {
    pub reviewer_id: String,
    pub reviewed_at: DateTime<Utc>,
    pub reject_reason: Option<String>,
}

/// A submitted accrual request with its computed miles.
#[derive(Debug, Clone, PartialEq)]
pub struct AccrualRequest {
    pub id: Uuid,
    pub customer_id: Uuid,
    pub ticket_id: String,
    pub pnr: String,
    pub carrier: String,
    pub booking_class: String,
    pub from_code: String,
    pub to_code: String,
    pub departure_date: NaiveDate,
    pub ticket_image_url: Option<String>,
    pub boarding_pass_image_url: Option<String>,
    pub distance_miles: u32,
    pub qualifying_accrual_rate: f64,
    pub qualifying_miles: f64,
    pub bonus_accrual_rate: f64,
    pub bonus_miles: f64,
    pub status: RequestStatus,
    pub reviewer_id: Option<String>,
    pub reviewed_at: Option<DateTime<Utc>>,
    pub reject_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl AccrualRequest {
    /// A new in-progress request for `claim`, with no miles computed yet.
    pub fn submitted(customer_id: Uuid, claim: TicketClaim) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            customer_id,
            ticket_id: claim.ticket_id,
            pnr: claim.pnr,
            carrier: claim.carrier,
            booking_class: claim.booking_class,
            from_code: claim.from_code,
            to_code: claim.to_code,
            departure_date: claim.departure_date,
            ticket_image_url: claim.ticket_image_url,
            boarding_pass_image_url: claim.boarding_pass_image_url,
            distance_miles: 0,
            qualifying_accrual_rate: 0.0,
            qualifying_miles: 0.0,
            bonus_accrual_rate: 0.0,
            bonus_miles: 0.0,
            status: RequestStatus::InProgress,
            reviewer_id: None,
            reviewed_at: None,
            reject_reason: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Copy review details onto the request with its new terminal status.
    pub fn apply_review(&mut self, status: RequestStatus, review: &Review) {
        self.status = status;
        self.reviewer_id = Some(review.reviewer_id.clone());
        self.reviewed_at = Some(review.reviewed_at);
        self.reject_reason = review.reject_reason.clone();
        self.updated_at = review.reviewed_at;
    }
}
