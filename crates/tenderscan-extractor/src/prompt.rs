//! Prompt construction for fragment extraction

use tenderscan_domain::{ChunkId, DocumentId, PartOf};
use tenderscan_gatekeeper::OutputSchema;
use tenderscan_llm::CHUNK_ID_LABEL;

/// Builds the extraction prompt for one chunk
pub struct PromptBuilder<'a> {
    text: &'a str,
    document_id: &'a DocumentId,
    chunk_id: &'a ChunkId,
    heading_context: Option<&'a str>,
    part_of: &'a [PartOf],
}

impl<'a> PromptBuilder<'a> {
    /// Create a new prompt builder
    pub fn new(text: &'a str, document_id: &'a DocumentId, chunk_id: &'a ChunkId) -> Self {
        Self {
            text,
            document_id,
            chunk_id,
            heading_context: None,
            part_of: &[],
        }
    }

    /// Name the section the chunk starts in
    pub fn with_heading_context(mut self, heading: Option<&'a str>) -> Self {
        self.heading_context = heading;
        self
    }

    /// Tell the model which split elements this chunk continues
    pub fn with_part_of(mut self, part_of: &'a [PartOf]) -> Self {
        self.part_of = part_of;
        self
    }

    /// Build the complete extraction prompt
    pub fn build(&self) -> String {
        let mut prompt = String::new();

        // 1. Instructions
        prompt.push_str(EXTRACTION_INSTRUCTIONS);
        prompt.push_str("\n\n");

        // 2. Identity of the chunk
        prompt.push_str(&format!("Document ID: {}\n", self.document_id));
        prompt.push_str(&format!("{} {}\n", CHUNK_ID_LABEL, self.chunk_id));
        if let Some(heading) = self.heading_context {
            prompt.push_str(&format!("Section: {}\n", heading));
        }
        prompt.push('\n');

        // 3. Continuation notice
        if !self.part_of.is_empty() {
            prompt.push_str("This text is one fragment of a larger element:\n");
            for part in self.part_of {
                prompt.push_str(&format!(
                    "- {} (part {} of {})\n",
                    part.label, part.part, part.total
                ));
            }
            prompt.push_str(
                "Extract only what this fragment shows. Other fragments are extracted separately.\n\n",
            );
        }

        // 4. The text
        prompt.push_str("Text to analyze:\n");
        prompt.push_str("---\n");
        prompt.push_str(self.text);
        if !self.text.ends_with('\n') {
            prompt.push('\n');
        }
        prompt.push_str("---\n\n");

        // 5. Schema and format reminder
        prompt.push_str("JSON schema of the answer:\n");
        prompt.push_str(&OutputSchema::extraction_fragment().to_json_schema().to_string());
        prompt.push_str("\n\n");
        prompt.push_str(OUTPUT_FORMAT_REMINDER);

        prompt
    }
}

const EXTRACTION_INSTRUCTIONS: &str = r#"Extract structured tender data from the following text.
Return one JSON object with these optional sections:

- "requirements": technical and contractual requirements, as {"text", "mandatory"}
- "unit_prices": priced line items, as {"item", "quantity", "unit", "unit_price", "currency"}
- "deadlines": dated obligations, as {"kind", "date", "time", "description"}
- "tables": tables, as {"caption", "header", "rows", "footnotes": [{"marker", "text"}]}
- "contact": contact fields, as an object of scalars
- "administrative": tender number, authority, procedure and similar fields, as an object of scalars

Rules:
- Copy values exactly as written; never compute, convert or translate them
- Leave a section out (or null) when the text does not mention it
- Use [] or {} only when the text explicitly states there is nothing
- Use "" or 0 only when the text explicitly states an empty or zero value
- Keep footnote markers such as (*) in table cells
- Report every table row you see, including repeated headers"#;

const OUTPUT_FORMAT_REMINDER: &str =
    "Remember: Return ONLY valid JSON, no markdown code blocks, no explanations.";

#[cfg(test)]
mod tests {
    use super::*;
    use tenderscan_llm::chunk_id_in;

    fn ids() -> (DocumentId, ChunkId) {
        (DocumentId::from_string("tender-7"), ChunkId::from_index(3))
    }

    #[test]
    fn test_prompt_includes_identity_and_text() {
        let (doc, chunk) = ids();
        let prompt = PromptBuilder::new("Bread 12,50 TL per kg", &doc, &chunk).build();
        assert!(prompt.contains("Document ID: tender-7"));
        assert!(prompt.contains("Chunk ID: c0003"));
        assert!(prompt.contains("Bread 12,50 TL per kg\n---"));
        assert_eq!(chunk_id_in(&prompt), Some("c0003"));
    }

    #[test]
    fn test_prompt_includes_schema_and_reminder() {
        let (doc, chunk) = ids();
        let prompt = PromptBuilder::new("text", &doc, &chunk).build();
        assert!(prompt.contains("\"unit_prices\""));
        assert!(prompt.contains("JSON schema of the answer:"));
        assert!(prompt.ends_with(OUTPUT_FORMAT_REMINDER));
        assert!(!prompt.contains("fragment of a larger element"));
    }

    #[test]
    fn test_prompt_includes_heading_and_continuation() {
        let (doc, chunk) = ids();
        let parts = vec![PartOf {
            element: None,
            label: "Table 2: Unit prices".to_string(),
            part: 2,
            total: 3,
        }];
        let prompt = PromptBuilder::new("| Milk | l | 9,00 |", &doc, &chunk)
            .with_heading_context(Some("12.3 Delivery Penalties"))
            .with_part_of(&parts)
            .build();
        assert!(prompt.contains("Section: 12.3 Delivery Penalties"));
        assert!(prompt.contains("- Table 2: Unit prices (part 2 of 3)"));
    }
}
