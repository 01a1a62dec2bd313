//! Request and response messages exchanged between clients and the server
//!
//! Field names follow the JSON conventions of the dispatch API
//! (`serialNumber`, `weightLimitGrams`, ...).

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::error::{DispatchError, ErrorKind};
use crate::model::{Drone, DroneModel, DroneState, Medicine};
use crate::{now_ms, parts};

/// Message header carried by every envelope
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Header {
    /// Chosen by the client, echoed in the response
    pub request_id: u64,
    pub timestamp_ms: u64,
}

impl Header {
    /// Create a new header stamped with the current time
    pub fn new(request_id: u64) -> Self {
        Self {
            request_id,
            timestamp_ms: now_ms(),
        }
    }
}

/// A request frame
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestEnvelope {
    pub header: Header,
    pub request: Request,
}

impl RequestEnvelope {
    pub fn new(request_id: u64, request: Request) -> Self {
        Self {
            header: Header::new(request_id),
            request,
        }
    }
}

/// A response frame
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseEnvelope {
    pub header: Header,
    pub response: Response,
}

impl ResponseEnvelope {
    /// Create the response to the request with the given id
    pub fn reply(request_id: u64, response: Response) -> Self {
        Self {
            header: Header::new(request_id),
            response,
        }
    }
}

/// Operations offered by the dispatch server
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "camelCase")]
pub enum Request {
    Register(RegisterDrone),
    LoadMedicine(LoadMedicine),
    GetDrone(DroneLookup),
}

/// Drone registration input
///
/// Numeric fields are wide so that out-of-range values reach validation and
/// are reported against the offending field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterDrone {
    pub serial_number: String,
    pub model: DroneModel,
    pub weight_limit_grams: i64,
    pub battery_percentage: i64,
}

/// Cargo loading input: multipart-style parts correlated by medicine code
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoadMedicine {
    pub serial_number: String,
    pub parts: Vec<UploadPart>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DroneLookup {
    pub serial_number: String,
}

/// JSON body of a `medicines` part
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MedicineDeclaration {
    pub name: String,
    pub weight_grams: i64,
    pub code: String,
}

/// One part of a loading upload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadPart {
    /// Either [`parts::MEDICINES`] or [`parts::IMAGES`]
    pub name: String,
    /// For images: `<CODE>.<ext>`
    pub filename: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
    #[serde(with = "base64_bytes")]
    pub data: Bytes,
}

impl UploadPart {
    /// Build a `medicines` part holding the JSON form of a declaration
    pub fn declaration(declaration: &MedicineDeclaration) -> Result<Self, serde_json::Error> {
        Ok(Self {
            name: parts::MEDICINES.into(),
            filename: declaration.code.clone(),
            content_type: Some("application/json".into()),
            data: Bytes::from(serde_json::to_vec(declaration)?),
        })
    }

    /// Build an `images` part
    pub fn image(filename: impl Into<String>, data: impl Into<Bytes>) -> Self {
        Self {
            name: parts::IMAGES.into(),
            filename: filename.into(),
            content_type: None,
            data: data.into(),
        }
    }
}

/// Server reply
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum Response {
    Drone(DroneView),
    Error(ErrorBody),
}

impl Response {
    pub fn error(err: &DispatchError) -> Self {
        Response::Error(ErrorBody {
            kind: err.kind(),
            message: err.to_string(),
        })
    }
}

impl From<Result<Drone, DispatchError>> for Response {
    fn from(result: Result<Drone, DispatchError>) -> Self {
        match result {
            Ok(drone) => Response::Drone(DroneView::from(&drone)),
            Err(err) => Response::error(&err),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub kind: ErrorKind,
    pub message: String,
}

/// Read-only projection of a drone; image data is never included
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DroneView {
    pub serial_number: String,
    pub model: DroneModel,
    pub weight_limit_grams: u32,
    pub battery_percentage: u8,
    pub state: DroneState,
    pub medicines: Vec<MedicineView>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MedicineView {
    pub name: String,
    pub weight_grams: u32,
    pub code: String,
}

impl From<&Drone> for DroneView {
    fn from(drone: &Drone) -> Self {
        Self {
            serial_number: drone.serial_number().to_string(),
            model: drone.model(),
            weight_limit_grams: drone.weight_limit_grams(),
            battery_percentage: drone.battery_percentage(),
            state: drone.state(),
            medicines: drone.cargo().iter().map(MedicineView::from).collect(),
        }
    }
}

impl From<&Medicine> for MedicineView {
    fn from(medicine: &Medicine) -> Self {
        Self {
            name: medicine.name().to_string(),
            weight_grams: medicine.weight_grams(),
            code: medicine.code().to_string(),
        }
    }
}

/// Binary part data travels as base64 inside the JSON frame
mod base64_bytes {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine as _;
    use bytes::Bytes;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(data: &Bytes, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(data))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Bytes, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD
            .decode(encoded)
            .map(Bytes::from)
            .map_err(serde::de::Error::custom)
    }
}
