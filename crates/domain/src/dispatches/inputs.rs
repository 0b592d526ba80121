use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::errors::Error;

use super::incidents::IncidentCategory;

/// Fields shared by every freshly routed dispatch.
#[derive(Clone, Debug, Serialize, Deserialize, Eq, PartialEq)]
pub struct DeliveryDetails {
    pub origin_pharmacy_id: String,
    pub rider_id: String,
    pub vehicle_id: String,
    pub delivery_address: String,
    #[serde(default)]
    pub order_code: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize, Eq, PartialEq)]
pub struct PrescriptionDetails {
    pub number: String,
    pub physician_name: String,
    pub issued_on: NaiveDate,
    #[serde(default)]
    pub notes: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize, Eq, PartialEq)]
pub struct CreateDirectInput {
    #[serde(flatten)]
    pub delivery: DeliveryDetails,
}

#[derive(Clone, Debug, Serialize, Deserialize, Eq, PartialEq)]
pub struct CreatePrescriptionInput {
    #[serde(flatten)]
    pub delivery: DeliveryDetails,
    pub prescription: PrescriptionDetails,
}

#[derive(Clone, Debug, Serialize, Deserialize, Eq, PartialEq)]
pub struct CreateTransferInput {
    #[serde(flatten)]
    pub delivery: DeliveryDetails,
    pub secondary_pharmacy_id: String,
}

#[derive(Clone, Debug, Serialize, Deserialize, Eq, PartialEq)]
pub struct CreateResendInput {
    pub original_dispatch_id: String,
    pub rider_id: String,
    pub vehicle_id: String,
    pub delivery_address: String,
    #[serde(default)]
    pub notes: Option<String>,
}

/// One of the four creation variants.
#[derive(Clone, Debug, Serialize, Deserialize, Eq, PartialEq)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum CreationRequest {
    Direct(CreateDirectInput),
    Prescription(CreatePrescriptionInput),
    Transfer(CreateTransferInput),
    Resend(CreateResendInput),
}

/// Field edits allowed while a dispatch is still open. Absent fields are left as they are.
#[derive(Clone, Debug, Default, Serialize, Deserialize, Eq, PartialEq)]
pub struct DispatchChanges {
    #[serde(default)]
    pub rider_id: Option<String>,
    #[serde(default)]
    pub vehicle_id: Option<String>,
    #[serde(default)]
    pub delivery_address: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
}

impl DispatchChanges {
    pub fn is_empty(&self) -> bool {
        self.rider_id.is_none()
            && self.vehicle_id.is_none()
            && self.delivery_address.is_none()
            && self.notes.is_none()
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CancelDispatchInput {
    pub reason: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FailDispatchInput {
    #[serde(default)]
    pub reason: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ReportIncidentInput {
    pub category: IncidentCategory,
    pub description: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct UploadPrescriptionInput {
    pub file_name: String,
    pub content_type: String,
}

impl UploadPrescriptionInput {
    /// Final path component of the client's file name, reduced to `[A-Za-z0-9._-]`.
    pub fn object_name(&self) -> Result<String, Error> {
        let base = self
            .file_name
            .rsplit(|c: char| c == '/' || c == '\\')
            .next()
            .unwrap_or_default();

        let name: String = base
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                    c
                } else {
                    '_'
                }
            })
            .collect();

        let name = name.trim_start_matches('.');
        if name.is_empty() {
            return Err(Error::validation("A file name is required"));
        }
        Ok(name.to_string())
    }
}
