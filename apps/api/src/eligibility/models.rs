use serde::{Deserialize, Serialize};

/// Body of `POST /eligibility`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EligibilityRequest {
    pub pdf_link: String,
}

/// Success body. `criteria` is the provider's tool call, passed through untouched.
#[derive(Debug, Clone, Serialize)]
pub struct EligibilityResponse {
    pub criteria: serde_json::Value,
}

/// The four-field result the `checkEligibility` schema asks the assistant to fill.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EligibilityResult {
    #[serde(default)]
    pub prime_applicant_types: Vec<String>,
    #[serde(default)]
    pub sub_applicant_types: Vec<String>,
    #[serde(default)]
    pub qualifiers: Vec<String>,
    #[serde(default)]
    pub disqualifiers: Vec<String>,
}

/// Decoded `checkEligibility` arguments.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckEligibilityArguments {
    #[serde(default)]
    pub filename: String,
    pub eligibility: EligibilityResult,
}

impl CheckEligibilityArguments {
    /// Decodes the JSON-encoded `function.arguments` string of a raw tool call.
    pub fn from_tool_call(tool_call: &serde_json::Value) -> Option<Result<Self, serde_json::Error>> {
        tool_call
            .get("function")
            .and_then(|f| f.get("arguments"))
            .and_then(|a| a.as_str())
            .map(serde_json::from_str)
    }
}
