//! Request and response bodies of the HTTP API

use serde::{Deserialize, Serialize};

/// Passenger features; every field is optional
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PassengerInput {
    #[serde(rename = "Pclass", default)]
    pub pclass: Option<f64>,
    #[serde(rename = "Sex", default)]
    pub sex: Option<f64>,
    #[serde(rename = "Age", default)]
    pub age: Option<f64>,
    #[serde(rename = "SibSp", default)]
    pub sib_sp: Option<f64>,
    #[serde(rename = "Parch", default)]
    pub parch: Option<f64>,
    #[serde(rename = "Fare", default)]
    pub fare: Option<f64>,
    #[serde(rename = "Embarked", default)]
    pub embarked: Option<f64>,
    #[serde(rename = "Title", default)]
    pub title: Option<f64>,
    #[serde(rename = "FamilySize", default)]
    pub family_size: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PredictionResponse {
    /// 1 when the positive-class probability is at least 0.5
    pub prediction: u8,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthResponse {
    pub msg: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}
