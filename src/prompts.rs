//! System prompts and user messages for the two LLM stages.
//!
//! Both prompts live here so a wording change touches one file and tests
//! can inspect them without a model. Callers override either one via
//! [`crate::config::PipelineConfig::extraction_prompt`] and
//! [`crate::config::PipelineConfig::standardization_prompt`].

/// System prompt for stage 2: page text → JSON array of line items.
pub const EXTRACTION_SYSTEM_PROMPT: &str = "You are an expert financial analyst. Your task is to extract various line items and their values from the provided text. \
Output the extracted data as a JSON array of objects, where each object has 'item_number' (if there is an item number, or else leave blank), 'statement_type', 'item', 'year', and 'value'. \
Ensure values are numeric (remove commas, currency symbols, etc.) or leave empty if not found. \
Ensure that the line items, as well as the names of the statements, are in the same language as the text. \
Sometimes there can be grammatical errors and line item numbering errors; fix them as well, but don't be too rigid. \
ONLY take the current year from this statement, not the previous years. \
Make sure that the line items are in proper form: no FULL CAPITALIZATION, only First Letter Capitalization. \
Output ONLY the JSON array, with no commentary.";

/// System prompt for stage 5: raw item names → ordered canonical groups.
pub const STANDARDIZATION_SYSTEM_PROMPT: &str = "You are an expert financial analyst specializing in financial statements. \
Your task is to standardize financial statement line items. \
You will be given a list of items, which may contain variations due to OCR errors, slightly different phrasing, or garbled numbering. \
For each group of semantically similar items, identify them and propose a single, concise, and commonly accepted standardized name. \
The standardized name should be in proper case (first letter of each word capitalized). \
Prioritize standardized names that include a line item number if available among the original items. \
If an item is a 'total' type item, ensure its standardized name clearly reflects it as a total. \
Make sure that items grouped under one name do not carry different values from each other, since there can be sub-items that share a name but belong to different parent items. \
Output the mapping as a JSON array of objects. Each object in the array represents a standardized item and has two keys: \
'standardized_item' (the proposed standardized name) and 'original_items' (a list of all original items that map to this standardized name). \
The order of objects in the JSON array MUST follow the logical order of items in a financial statement (e.g., assets before liabilities, short-term before long-term, and within sections, by line item number if present). \
Ensure every original item from the input list appears in exactly one group of your output mapping.";

/// User message for stage 2.
pub fn extraction_user_message(text: &str) -> String {
    format!(
        "Extract the 3 main statements from the Financial report, put the columns as \
        ['statement_type', 'item', 'year', 'value'] :\n\n{text}"
    )
}

/// User message for stage 5. `items_json` is the pretty-printed item list.
pub fn standardization_user_message(items_json: &str) -> String {
    format!("Standardize the following financial statement items:\n\n{items_json}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extraction_prompt_names_every_column() {
        for col in ["item_number", "statement_type", "item", "year", "value"] {
            assert!(EXTRACTION_SYSTEM_PROMPT.contains(col), "missing {col}");
        }
        assert!(EXTRACTION_SYSTEM_PROMPT.contains("current year"));
    }

    #[test]
    fn standardization_prompt_names_mapping_keys() {
        assert!(STANDARDIZATION_SYSTEM_PROMPT.contains("standardized_item"));
        assert!(STANDARDIZATION_SYSTEM_PROMPT.contains("original_items"));
    }

    #[test]
    fn user_messages_embed_payload() {
        assert!(extraction_user_message("--- PAGE 1 ---\nCash 100").ends_with("Cash 100"));
        assert!(standardization_user_message("[\"Cash\"]").ends_with("[\"Cash\"]"));
    }
}
