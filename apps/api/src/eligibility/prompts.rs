// Prompts and the function schema for grant-eligibility extraction.

use serde_json::json;

use crate::provider::FunctionDefinition;

pub const CHECK_ELIGIBILITY_FUNCTION: &str = "checkEligibility";

pub const ASSISTANT_NAME: &str = "Grant Eligibility Extractor";

pub const ASSISTANT_INSTRUCTIONS: &str = "\
    You are an expert grant analyst. You read grant notices of funding opportunity \
    and extract who is eligible to apply. Use the attached document as your only \
    source. Report your findings exclusively by calling the checkEligibility function. \
    Do NOT answer in free text. If a field is not covered by the document, return an \
    empty array for it rather than guessing.";

pub const USER_MESSAGE_TEMPLATE: &str = "\
    Return the eligibility criteria of the attached grant document ({filename}) by \
    calling the checkEligibility function.\n\n\
    Definitions:\n\
    - A prime applicant is an entity that may apply for and receive the award directly \
    from the funding agency and is accountable for it.\n\
    - A sub applicant is an entity that may not apply directly but may participate \
    through a subaward or partnership with a prime applicant.\n\n\
    List qualifiers (requirements an applicant must meet) and disqualifiers \
    (conditions that make an applicant ineligible) as short, self-contained statements.";

pub fn user_message(filename: &str) -> String {
    USER_MESSAGE_TEMPLATE.replace("{filename}", filename)
}

fn string_array(description: &str) -> serde_json::Value {
    json!({
        "type": "array",
        "description": description,
        "items": { "type": "string" }
    })
}

/// The only tool registered on the ephemeral assistant.
pub fn check_eligibility_function() -> FunctionDefinition {
    FunctionDefinition {
        name: CHECK_ELIGIBILITY_FUNCTION.to_string(),
        description: "Report the eligibility criteria found in the grant document.".to_string(),
        parameters: json!({
            "type": "object",
            "properties": {
                "filename": {
                    "type": "string",
                    "description": "Name of the grant document that was analysed."
                },
                "eligibility": {
                    "type": "object",
                    "properties": {
                        "prime_applicant_types": string_array(
                            "Entity types eligible to apply directly as the prime applicant."
                        ),
                        "sub_applicant_types": string_array(
                            "Entity types eligible to participate as sub applicants."
                        ),
                        "qualifiers": string_array(
                            "Requirements an applicant must satisfy."
                        ),
                        "disqualifiers": string_array(
                            "Conditions that make an applicant ineligible."
                        )
                    },
                    "required": [
                        "prime_applicant_types",
                        "sub_applicant_types",
                        "qualifiers",
                        "disqualifiers"
                    ]
                }
            },
            "required": ["filename", "eligibility"]
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schema_enumerates_all_eligibility_fields() {
        let function = check_eligibility_function();
        assert_eq!(function.name, "checkEligibility");

        let eligibility = &function.parameters["properties"]["eligibility"]["properties"];
        for field in [
            "prime_applicant_types",
            "sub_applicant_types",
            "qualifiers",
            "disqualifiers",
        ] {
            assert_eq!(eligibility[field]["type"], "array", "{field}");
            assert_eq!(eligibility[field]["items"]["type"], "string", "{field}");
        }
        assert_eq!(function.parameters["properties"]["filename"]["type"], "string");
    }

    #[test]
    fn test_user_message_defines_applicant_roles_and_names_file() {
        let message = user_message("grant.pdf");
        assert!(message.contains("grant.pdf"));
        assert!(message.contains("checkEligibility"));
        assert!(message.contains("prime applicant"));
        assert!(message.contains("sub applicant"));
    }
}
