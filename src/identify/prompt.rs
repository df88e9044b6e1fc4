use serde_json::{json, Value};

const IDENTIFY_TEMPLATE: &str = "You are an expert pharmacist. You will identify the medicine from the image and provide its uses in the specified language.

The user will upload a picture of the medicine, which you will identify and state the name.

You will also provide the uses of the medicine in the following language: {language}.

Language: {language}

Respond with a JSON object with exactly two string fields: \"medicineName\" (the name of the identified medicine) and \"uses\" (the uses of the identified medicine in the specified language).";

/// Render the identification prompt for a response language.
pub fn identify_prompt(language: &str) -> String {
    IDENTIFY_TEMPLATE.replace("{language}", language.trim())
}

/// Structured-output schema for providers that accept one.
pub fn result_schema() -> Value {
    json!({
        "type": "OBJECT",
        "properties": {
            "medicineName": {
                "type": "STRING",
                "description": "The name of the identified medicine."
            },
            "uses": {
                "type": "STRING",
                "description": "The uses of the identified medicine in the specified language."
            }
        },
        "required": ["medicineName", "uses"]
    })
}
