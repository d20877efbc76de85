//! Instructions sent ahead of the document.

const WRONG_SHAPE_EXAMPLE: &str = r#"{"file": null, "pages": 1, "tables": [], "text": [...]}"#;
const SCHEMA_EXAMPLE: &str =
    r#"{"name": "John Doe", "contact": "1234567890", "application_no": "ABC123"}"#;
const FREEFORM_EXAMPLE: &str =
    r#"{"document_type": "Application", "name": "John Doe", "id": "123456"}"#;

/// Builds the extraction prompt.
///
/// A schema starting with `{` is embedded as a JSON structure; anything else
/// is treated as a list of field names.
pub fn build_prompt(schema: Option<&str>, has_file: bool) -> String {
    let mut prompt = String::new();

    match schema {
        Some(schema) => {
            prompt.push_str(
                "IMPORTANT: You must return ONLY a simple JSON object with the requested data fields.\n",
            );
            prompt.push_str(
                "DO NOT return any structure with 'file', 'pages', 'tables', or 'text' keys.\n",
            );
            prompt.push_str("DO NOT return arrays of text chunks or metadata.\n");
            prompt.push_str("Extract the actual data values and return them directly.\n\n");
            push_examples(&mut prompt, SCHEMA_EXAMPLE);

            if schema.trim_start().starts_with('{') {
                prompt.push_str("Required JSON structure:\n");
            } else {
                prompt.push_str("Required fields to extract: ");
            }
            prompt.push_str(schema);
            prompt.push_str("\n\n");

            if has_file {
                prompt.push_str(
                    "Read the PDF content and extract only the requested field values. \
                     Return the simple JSON object with extracted values only.\n",
                );
            } else {
                prompt.push_str(
                    "Create a JSON object with the specified keys, using null for unavailable data.\n",
                );
            }
        }
        None => {
            prompt.push_str(
                "IMPORTANT: Extract meaningful data from the PDF as a simple JSON object.\n",
            );
            prompt.push_str(
                "DO NOT return metadata like 'file', 'pages', 'tables', or 'text' arrays.\n",
            );
            prompt.push_str("DO NOT return document structure information.\n");
            prompt.push_str(
                "Extract actual content values like names, numbers, addresses, etc.\n\n",
            );
            push_examples(&mut prompt, FREEFORM_EXAMPLE);
            prompt.push_str("Analyze the PDF and return only the extracted content values.\n");
        }
    }

    prompt
}

fn push_examples(prompt: &mut String, correct: &str) {
    prompt.push_str("Example of what NOT to return:\n");
    prompt.push_str(WRONG_SHAPE_EXAMPLE);
    prompt.push_str("\n\n");
    prompt.push_str("Example of correct format:\n");
    prompt.push_str(correct);
    prompt.push_str("\n\n");
}
