//! End-to-end scenarios for the pipeline

#[cfg(test)]
mod tests {
    use crate::{Pipeline, PipelineConfig, PipelineOutcome};
    use serde_json::{json, Map, Value};
    use tenderscan_domain::traits::{Completion, LlmProvider};
    use tenderscan_domain::{ConflictKind, Document, DocumentId, Section, Severity};
    use tenderscan_llm::MockProvider;
    use tenderscan_monitor::MonitorHandle;

    /// A model that reads the chunk out of the prompt and reports its
    /// tables, priced rows and "shall" sentences verbatim
    struct ReadingModel;

    fn chunk_of(prompt: &str) -> &str {
        let start = prompt
            .find("Text to analyze:\n---\n")
            .map(|i| i + "Text to analyze:\n---\n".len())
            .unwrap_or(0);
        let end = prompt
            .rfind("---\n\nJSON schema of the answer:")
            .unwrap_or(prompt.len());
        &prompt[start..end]
    }

    fn read(text: &str) -> Value {
        let mut caption = None;
        let mut header: Option<Vec<String>> = None;
        let mut rows: Vec<Vec<String>> = Vec::new();
        let mut prices = Vec::new();
        let mut footnotes = Vec::new();
        let mut requirements = Vec::new();

        for line in text.lines() {
            let line = line.trim();
            if line.starts_with('|') {
                let cells: Vec<String> = line
                    .trim_matches('|')
                    .split('|')
                    .map(|c| c.trim().to_string())
                    .collect();
                if cells.iter().all(|c| c.chars().all(|ch| ch == '-' || ch == ':')) {
                    continue;
                }
                if header.is_none() {
                    header = Some(cells.clone());
                } else if header.as_ref() != Some(&cells) {
                    if let [item, unit, price] = cells.as_slice() {
                        prices.push(json!({
                            "item": item.replace("(*)", "").trim(),
                            "unit": unit,
                            "unit_price": price,
                        }));
                    }
                }
                rows.push(cells);
            } else if line.starts_with("Table ") {
                caption = Some(line.to_string());
            } else if let Some(body) = line.strip_prefix("(*)") {
                footnotes.push(json!({"marker": "(*)", "text": body.trim()}));
            } else if line.contains(" shall ") {
                requirements.push(json!({"text": line, "mandatory": true}));
            }
        }

        let mut fragment = Map::new();
        if !rows.is_empty() {
            fragment.insert(
                "tables".to_string(),
                json!([{
                    "caption": caption,
                    "header": header.unwrap_or_default(),
                    "rows": rows,
                    "footnotes": footnotes,
                }]),
            );
            fragment.insert("unit_prices".to_string(), Value::Array(prices));
        }
        if !requirements.is_empty() {
            fragment.insert("requirements".to_string(), Value::Array(requirements));
        }
        Value::Object(fragment)
    }

    impl LlmProvider for ReadingModel {
        type Error = String;

        fn name(&self) -> &str {
            "reader"
        }

        fn generate(&self, prompt: &str) -> Result<Completion, Self::Error> {
            Ok(Completion::text(read(chunk_of(prompt)).to_string()))
        }
    }

    fn small_chunks(max_chunk_chars: usize) -> PipelineConfig {
        let mut config = PipelineConfig {
            max_chunk_chars,
            heading_min_body_chars: 20,
            retry_backoff_ms: 1,
            ..PipelineConfig::default()
        };
        config.gatekeeper.heading_min_body_chars = 20;
        config
    }

    async fn run<L>(provider: L, config: PipelineConfig, text: &str) -> (PipelineOutcome, MonitorHandle)
    where
        L: LlmProvider + Send + Sync + 'static,
        L::Error: std::fmt::Display,
    {
        let document = Document::with_id(DocumentId::from_string("tender-1"), text);
        let monitor = MonitorHandle::for_document("tender-1");
        let outcome = Pipeline::new(provider, config)
            .process(&document, &monitor)
            .await
            .unwrap();
        (outcome, monitor)
    }

    fn p0_passed(outcome: &PipelineOutcome, code: &str) -> bool {
        outcome
            .validation
            .p0
            .checks
            .iter()
            .any(|c| c.code == code && c.passed)
    }

    #[tokio::test]
    async fn test_table_split_across_chunks_is_one_table() {
        let text = "\
ARTICLE 1 - Prices
Unit prices for the catering service are listed below.

Table 1: Unit prices
| Item | Unit | Price |
|------|------|-------|
| Bread | kg | 12,50 |
| Milk | l | 9,00 |
| Cheese | kg | 85,00 |
| Olives | kg | 60,00 |
| Eggs | piece | 2,75 |
| Butter | kg | 120,00 |
";
        let (outcome, monitor) = run(ReadingModel, small_chunks(120), text).await;

        let table_chunks = outcome
            .chunks
            .iter()
            .filter(|c| c.part_of.iter().any(|p| p.element.is_some()))
            .count();
        assert!(table_chunks >= 2, "table should span several chunks");

        let tables = outcome.assembled.tables.as_ref().unwrap();
        assert_eq!(tables.len(), 1);
        let table = &tables[0];
        assert!(table.element.is_some());
        assert_eq!(table.fragments.len(), table_chunks);
        assert_eq!(table.header, vec!["Item", "Unit", "Price"]);
        let items: Vec<&str> = table.rows.iter().map(|r| r.cells[0].as_str()).collect();
        assert_eq!(items, vec!["Bread", "Milk", "Cheese", "Olives", "Eggs", "Butter"]);
        assert!(p0_passed(&outcome, "P0-01"));

        assert_eq!(outcome.assembled.section_len(Section::UnitPrices), 6);
        let metrics = monitor.metrics();
        assert_eq!(metrics.total_chunks, outcome.chunks.len());
        assert_eq!(metrics.api_calls.get("reader"), Some(&outcome.chunks.len()));
    }

    #[tokio::test]
    async fn test_nested_list_item_is_kept_under_its_heading() {
        let text = "\
12.3 Penalties
Late or faulty deliveries are penalised as follows.
12.3.4.a Perishable goods:
12.3.4.a.i Bread shall be delivered before 07:00
12.3.4.a.ii Milk shall be kept below 4 degrees
12.3.4.a.iii Fruit shall be washed before delivery
";
        let (outcome, _) = run(ReadingModel, small_chunks(120), text).await;

        let (element, _) = outcome
            .index
            .list_items()
            .find(|(_, item)| item.index == "12.3.4.a.ii")
            .unwrap();
        let parents: Vec<String> = outcome
            .index
            .ancestors(element.id)
            .iter()
            .filter_map(|e| e.as_list_item().map(|l| l.index.clone()))
            .collect();
        assert!(parents.contains(&"12.3.4.a".to_string()));
        let heading = outcome
            .index
            .find_nearest_heading(element.span.start)
            .and_then(|e| e.as_heading())
            .unwrap();
        assert_eq!(heading.display_text(), "12.3 Penalties");

        let wanted = "12.3.4.a.ii Milk shall be kept below 4 degrees";
        let requirements = outcome.assembled.requirements.as_ref().unwrap();
        let record = requirements
            .iter()
            .find(|r| r.fields.get("text") == Some(&json!(wanted)))
            .unwrap();
        let provenance = &record.provenance[0];
        let span = provenance.source_span.unwrap();
        assert_eq!(span.slice(text), Some(wanted));
        let chunk = outcome
            .chunks
            .iter()
            .find(|c| c.id == provenance.source_chunk_id)
            .unwrap();
        assert_eq!(chunk.heading_context.as_deref(), Some("12.3 Penalties"));
    }

    #[tokio::test]
    async fn test_footnoted_price_table_keeps_its_link() {
        let text = "\
ARTICLE 3 - Dairy prices
Prices below are binding for the whole term.

Table 3: Dairy prices
| Item | Unit | Price |
|------|------|-------|
| Milk | l | 9,00 |
| Butter (*) | kg | 120,00 |
| Cheese | kg | 85,00 |
(*) Unsalted, delivered chilled
";
        let (outcome, _) = run(ReadingModel, PipelineConfig::default(), text).await;

        let table = &outcome.assembled.tables.as_ref().unwrap()[0];
        let butter = table
            .rows
            .iter()
            .position(|r| r.cells[0] == "Butter (*)")
            .unwrap();
        assert_eq!(table.rows[butter].footnotes, vec!["(*)"]);
        assert!(table
            .rows
            .iter()
            .enumerate()
            .all(|(i, r)| i == butter || r.footnotes.is_empty()));
        assert_eq!(table.footnotes.len(), 1);
        assert_eq!(table.footnotes[0].text, "Unsalted, delivered chilled");
        assert_eq!(table.footnotes[0].rows, vec![butter]);

        assert!(p0_passed(&outcome, "P0-02"));
        assert!(outcome.no_new_information.passed);
        assert!(outcome.accepted, "{:?}", outcome.validation.p0.violations);
    }

    #[tokio::test]
    async fn test_references_resolve_or_stay_unresolved() {
        let text = "\
ARTICLE 1 - Scope
The contractor supplies meals to the hospital kitchens.

ARTICLE 2 - Delivery
Meals are delivered before 07:00 every day.

ARTICLE 3 - Payment
Payment follows delivery as specified in Article 2. Invoices are checked as described in Annex C.
";
        let (outcome, _) = run(MockProvider::default(), PipelineConfig::default(), text).await;

        let references = &outcome.assembled.references;
        assert_eq!(references.len(), 2);
        let article = references.iter().find(|r| r.label == "2").unwrap();
        assert_eq!(article.target_heading.as_deref(), Some("2 Delivery"));
        assert_eq!(article.mention, "as specified in Article 2");

        let unresolved = &outcome.assembled.unresolved_references;
        assert_eq!(unresolved.len(), 1);
        assert_eq!(unresolved[0].label, "C");
        assert!(unresolved[0].target_heading.is_none());
    }

    #[tokio::test]
    async fn test_disagreeing_prices_become_a_conflict() {
        let mut text = String::from(
            "ARTICLE 1 - Prices\nBread is supplied at 12,50 per kg for the first year of the contract term.\n\n",
        );
        text.push_str("ARTICLE 2 - Quality\n");
        for n in 1..=4 {
            text.push_str(&format!("Quality inspection round {} covers storage, hygiene and labelling.\n", n));
        }
        text.push_str(
            "\nARTICLE 5 - Price revision\nFrom the second year bread is supplied at 13,00 per kg under the revised schedule.\n",
        );

        let provider = MockProvider::default();
        provider.add_response(
            "first year of the contract",
            r#"{"unit_prices": [{"item": "Bread", "unit": "kg", "unit_price": "12,50"}]}"#,
        );
        provider.add_response(
            "revised schedule",
            r#"{"unit_prices": [{"item": "bread", "unit": "kg", "unit_price": "13,00"}]}"#,
        );
        let (outcome, _) = run(provider, small_chunks(150), &text).await;

        assert_eq!(outcome.conflicts.len(), 1);
        let conflict = &outcome.conflicts[0];
        assert_eq!(conflict.field_path, "unit_prices[bread].unit_price");
        assert_eq!(conflict.severity, Severity::Critical);
        assert_eq!(conflict.kind, ConflictKind::DifferentValues);
        assert_ne!(conflict.values[0].source_chunk_id, conflict.values[1].source_chunk_id);

        assert_eq!(outcome.assembled.conflicts, outcome.conflicts);
        let prices = outcome.assembled.unit_prices.as_ref().unwrap();
        assert_eq!(prices.len(), 2);
        assert!(prices
            .iter()
            .all(|r| r.conflicts == vec!["unit_prices[bread].unit_price".to_string()]));
        assert_eq!(outcome.conflict_report.critical_conflicts, 1);
        assert!(p0_passed(&outcome, "P0-09"));
    }
}
