//! Domain Models
//!
//! Wire types for the mining-operations backend: equipment, activity types,
//! materials, users and the operation records that tie them together.
//!
//! The backend sometimes returns references as bare ids and sometimes as
//! populated documents, so every reference field is a [`Ref`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Prefix of operation ids fabricated on the device before the server saw them
pub const LOCAL_ID_PREFIX: &str = "local_";

/// Anything with a backend identity
pub trait Identified {
    fn id(&self) -> &str;
}

/// A reference that is either a bare id or the populated document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Ref<T> {
    /// Bare identifier
    Id(String),
    /// Populated document
    Populated(T),
}

impl<T: Identified> Ref<T> {
    /// Identifier of the referenced document
    pub fn id(&self) -> &str {
        match self {
            Ref::Id(id) => id,
            Ref::Populated(doc) => doc.id(),
        }
    }

    /// The populated document, if the backend sent one
    pub fn populated(&self) -> Option<&T> {
        match self {
            Ref::Id(_) => None,
            Ref::Populated(doc) => Some(doc),
        }
    }
}

impl<T> From<&str> for Ref<T> {
    fn from(id: &str) -> Self {
        Ref::Id(id.to_string())
    }
}

/// Equipment category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EquipmentCategory {
    /// Excavators, loaders
    Loading,
    /// Trucks
    Transport,
}

/// Equipment availability
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EquipmentStatus {
    Active,
    Inactive,
    Maintenance,
}

/// A piece of equipment operators can run operations on
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Equipment {
    #[serde(rename = "_id")]
    pub id: String,
    pub name: String,
    pub category: EquipmentCategory,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub capacity: Option<f64>,
    pub status: EquipmentStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<String>,
}

impl Equipment {
    /// Stand-in used when only the equipment id is known
    pub fn placeholder(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: "Equipment".to_string(),
            category: EquipmentCategory::Loading,
            capacity: None,
            status: EquipmentStatus::Active,
            created_at: None,
            updated_at: None,
        }
    }
}

impl Identified for Equipment {
    fn id(&self) -> &str {
        &self.id
    }
}

/// Which equipment an activity applies to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActivityType {
    Loading,
    Transport,
    General,
}

/// Reason taxonomy offered for stop/wait style activities
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ActivityDetails {
    #[serde(default)]
    pub stopped_reason: Vec<String>,
    #[serde(default)]
    pub waiting_reason: Vec<String>,
    #[serde(default)]
    pub custom_reason: Vec<String>,
}

impl ActivityDetails {
    pub fn is_empty(&self) -> bool {
        self.stopped_reason.is_empty()
            && self.waiting_reason.is_empty()
            && self.custom_reason.is_empty()
    }

    /// Every reason the operator may pick from
    pub fn all_reasons(&self) -> impl Iterator<Item = &str> {
        self.stopped_reason
            .iter()
            .chain(self.waiting_reason.iter())
            .chain(self.custom_reason.iter())
            .map(String::as_str)
    }
}

/// An activity type (loading, hauling, waiting, ...)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Activity {
    #[serde(rename = "_id")]
    pub id: String,
    pub name: String,
    pub activity_type: ActivityType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub activity_details: Option<ActivityDetails>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<String>,
}

impl Activity {
    /// Whether the activity can be run on equipment of `category`
    pub fn applies_to(&self, category: EquipmentCategory) -> bool {
        match self.activity_type {
            ActivityType::General => true,
            ActivityType::Loading => category == EquipmentCategory::Loading,
            ActivityType::Transport => category == EquipmentCategory::Transport,
        }
    }

    /// Loading and transport activities move material
    pub fn requires_material(&self) -> bool {
        matches!(
            self.activity_type,
            ActivityType::Loading | ActivityType::Transport
        )
    }

    /// Activities with a reason taxonomy need one of the reasons
    pub fn requires_detail_reason(&self) -> bool {
        self.activity_details
            .as_ref()
            .is_some_and(|details| !details.is_empty())
    }
}

impl Identified for Activity {
    fn id(&self) -> &str {
        &self.id
    }
}

/// Material classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MaterialType {
    Ore,
    Mineral,
    Waste,
    Processed,
    Other,
}

/// Free-form property attached to a material
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustomField {
    pub name: String,
    pub value: serde_json::Value,
}

/// Physical properties of a material
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MaterialProperties {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub density: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub volume: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub grade_percentage: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub moisture_content: Option<f64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub custom_fields: Vec<CustomField>,
}

/// A material that can be loaded or hauled
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Material {
    #[serde(rename = "_id")]
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub material_type: MaterialType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub properties: Option<MaterialProperties>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<String>,
}

impl Identified for Material {
    fn id(&self) -> &str {
        &self.id
    }
}

/// User role
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserRole {
    Operator,
    Administrator,
}

/// Authenticated user
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    #[serde(rename = "_id", alias = "id")]
    pub id: String,
    pub name: String,
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<UserRole>,
}

impl Identified for User {
    fn id(&self) -> &str {
        &self.id
    }
}

/// The (equipment, activity, material) triple identifying "the same" operation
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OperationKey {
    pub equipment_id: String,
    pub activity_id: String,
    pub material_id: Option<String>,
}

/// A timed record of equipment performing an activity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Operation {
    #[serde(rename = "_id", default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub equipment: Ref<Equipment>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operator: Option<Ref<User>>,
    pub activity: Ref<Activity>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub material: Option<Ref<Material>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub truck_being_loaded: Option<Ref<Equipment>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mining_front: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub destination: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub distance: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub activity_details: Option<String>,
    pub start_time: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub is_local: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<String>,
}

impl Operation {
    /// Build the local placeholder for a start that was queued offline
    pub fn local_placeholder(
        local_id: impl Into<String>,
        request: &StartOperationRequest,
        started_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Some(local_id.into()),
            equipment: Ref::Id(request.equipment.clone()),
            operator: None,
            activity: Ref::Id(request.activity.clone()),
            material: request.material.as_deref().map(Ref::from),
            truck_being_loaded: request.truck_being_loaded.as_deref().map(Ref::from),
            mining_front: request.mining_front.clone(),
            destination: request.destination.clone(),
            distance: None,
            activity_details: request.activity_details.clone(),
            start_time: started_at,
            end_time: None,
            is_local: true,
            created_at: None,
            updated_at: None,
        }
    }

    /// Stopped operations are terminal
    pub fn is_stopped(&self) -> bool {
        self.end_time.is_some()
    }

    /// Copy of this operation closed at `end_time`
    pub fn closed(&self, end_time: DateTime<Utc>, distance: Option<f64>) -> Self {
        Self {
            end_time: Some(end_time),
            distance: distance.or(self.distance),
            ..self.clone()
        }
    }

    /// Whether the server has never seen this operation
    pub fn is_local_only(&self) -> bool {
        self.is_local || self.id.as_deref().is_some_and(is_local_id)
    }

    pub fn key(&self) -> OperationKey {
        OperationKey {
            equipment_id: self.equipment.id().to_string(),
            activity_id: self.activity.id().to_string(),
            material_id: self.material.as_ref().map(|m| m.id().to_string()),
        }
    }

    /// Request that would start an operation with the same parameters
    pub fn to_start_request(&self) -> StartOperationRequest {
        StartOperationRequest {
            equipment: self.equipment.id().to_string(),
            activity: self.activity.id().to_string(),
            material: self.material.as_ref().map(|m| m.id().to_string()),
            truck_being_loaded: self.truck_being_loaded.as_ref().map(|t| t.id().to_string()),
            mining_front: self.mining_front.clone(),
            destination: self.destination.clone(),
            activity_details: self.activity_details.clone(),
        }
    }
}

/// Whether an id was fabricated on the device
pub fn is_local_id(id: &str) -> bool {
    id.starts_with(LOCAL_ID_PREFIX)
}

/// Body of `POST /operations/start`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartOperationRequest {
    pub equipment: String,
    pub activity: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub material: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub truck_being_loaded: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mining_front: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub destination: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub activity_details: Option<String>,
}

impl StartOperationRequest {
    pub fn key(&self) -> OperationKey {
        OperationKey {
            equipment_id: self.equipment.clone(),
            activity_id: self.activity.clone(),
            material_id: self.material.clone(),
        }
    }
}

/// Body of `POST /operations/:id/stop`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StopOperationRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub distance: Option<f64>,
}

/// Body of `PUT /operations/:id`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateOperationRequest {
    pub activity_details: String,
}

/// Optional fields chosen on the operation form
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OperationDetails {
    pub material: Option<String>,
    pub truck_being_loaded: Option<String>,
    pub mining_front: Option<String>,
    pub destination: Option<String>,
    /// Reason picked from the activity's taxonomy
    pub detail_reason: Option<String>,
    /// Free-text notes, used when no reason was picked
    pub notes: Option<String>,
}

/// Standard `{ success, data, error }` envelope
#[derive(Debug, Clone, Deserialize)]
pub struct ApiResponse<T> {
    #[serde(default)]
    pub success: bool,
    #[serde(default = "Option::default")]
    pub data: Option<T>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

/// Error body returned by the backend
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ErrorBody {
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

/// Body of `POST /auth/login`
#[derive(Debug, Clone, Serialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// Body of `POST /auth/register`
#[derive(Debug, Clone, Serialize)]
pub struct RegisterRequest {
    pub name: String,
    pub email: String,
    pub password: String,
}

/// Token and user returned by the auth endpoints
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthResponse {
    pub token: String,
    pub user: User,
}
