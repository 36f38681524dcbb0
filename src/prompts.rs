//! Prompt templates for VLM-based transaction extraction.
//!
//! Every prompt the pipeline sends lives here, so unit tests can inspect
//! them directly and a template change touches exactly one place. Callers
//! can override the instructions via
//! [`crate::config::ExtractionConfig::system_prompt`]; the templates are
//! used only when no override is provided.

use crate::pipeline::schema::{ColumnSchema, DateOrder};
use edgequake_llm::ImageData;
use serde::{Deserialize, Serialize};

/// Kind of statement being processed. Selects the prompt template and the
/// sign convention used when parsing amounts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentKind {
    /// Credit-card statement: one amount column plus a Debit/Credit marker.
    #[default]
    CreditCard,
    /// Bank account statement: separate withdrawal/deposit columns and a
    /// running balance.
    Bank,
}

impl std::fmt::Display for DocumentKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DocumentKind::CreditCard => f.write_str("credit_card"),
            DocumentKind::Bank => f.write_str("bank"),
        }
    }
}

/// Instructions for credit-card statements.
pub const CREDIT_CARD_PROMPT: &str = r#"You are a credit card statement extractor. The input is one page of a credit card statement.

Extract EVERY transaction on the page and return ONLY this JSON object:

{"transactions": [{"date": "DD/MM/YYYY", "description": "...", "amount": 0.00, "type": "Debit"}]}

Rules:
- date: the transaction date in DD/MM/YYYY format
- description: the full merchant / narration text, never truncated
- amount: a plain number without currency symbols or thousands separators
- type: "Credit" for payments, refunds, reversals and cashback; "Debit" for purchases, fees and charges
- Ignore summary boxes, reward points, minimum-due and credit-limit tables
- If the page has no transactions, return {"transactions": []}
- No markdown fences, no commentary"#;

/// Placeholder in [`BANK_PROMPT`] for the one-row schema example.
const SCHEMA_SLOT: &str = "{schema}";

/// Instructions for bank statements, using the compact column schema.
/// `{schema}` is replaced by a row template in the table's column order.
pub const BANK_PROMPT: &str = r#"You are a bank statement data extractor. The input is one page of a bank account statement.

Extract ALL transactions and return ONLY this JSON object, keeping the field order of the row:

{"transactions": [{schema}]}

Field mapping:
- dt: transaction date in DD-MM-YYYY format
- desc: the COMPLETE description / narration / particulars text
- ref: cheque or reference number if the table has one, else null
- dr: the table's DEBIT / WITHDRAWAL column value, 0.00 when empty
- cr: the table's CREDIT / DEPOSIT column value, 0.00 when empty
- bal: the running balance after the transaction
- type: "W" when dr > 0, "D" when cr > 0

Check each row: for ascending dates previous_balance + cr - dr must equal bal.
If a row fails that check, dr and cr are swapped; fix them.

Ignore opening/closing balance lines, headers, footers and summary rows.
If the page has no transactions, return {"transactions": []}
Output the JSON object only. No markdown fences, no commentary."#;

/// Column-order question asked once of the first bank transaction table.
pub const SCHEMA_PROMPT: &str = r#"Analyze this bank statement table and identify the column order. Look for the transaction table with headers like Date, Description/Particulars, Debit/Withdrawal, Credit/Deposit, Balance.

Reorder this JSON schema to match the visual column sequence:

[{"dt":"DD-MM-YYYY","desc":"DESCRIPTION","ref":null,"dr":0.00,"cr":0.00,"bal":0.00,"type":"W"}]

Rules:
- If Credit comes before Debit in the table, put "cr" before "dr"
- If Debit comes before Credit in the table, put "dr" before "cr"
- Always keep dt first and type last
- Also report whether the rows are dated oldest first (ASCENDING) or newest first (DESCENDING)

Return ONLY the reordered JSON array on one line, then on the next line:
Date_Order: ASCENDING or Date_Order: DESCENDING"#;

/// Yes/no classifier used to skip pages without a transaction table.
pub const TABLE_CHECK_PROMPT: &str = r#"Look at this image of a statement page. Does it contain a table of individual financial transactions (rows with a date, a description and an amount)?

Answer with exactly one word: YES or NO."#;

/// Fixed template per statement kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptTemplate {
    CreditCard,
    Bank,
}

impl PromptTemplate {
    pub fn for_kind(kind: DocumentKind) -> Self {
        match kind {
            DocumentKind::CreditCard => PromptTemplate::CreditCard,
            DocumentKind::Bank => PromptTemplate::Bank,
        }
    }

    pub fn instructions(self) -> &'static str {
        match self {
            PromptTemplate::CreditCard => CREDIT_CARD_PROMPT,
            PromptTemplate::Bank => BANK_PROMPT,
        }
    }

    /// Instructions with the bank row template filled in. Without a
    /// detected schema the debit column comes first.
    pub fn render(self, schema: Option<&ColumnSchema>) -> String {
        match self {
            PromptTemplate::CreditCard => CREDIT_CARD_PROMPT.to_string(),
            PromptTemplate::Bank => {
                let schema = schema.copied().unwrap_or_default();
                let mut text = BANK_PROMPT.replace(SCHEMA_SLOT, &schema.row_template());
                match schema.date_order {
                    DateOrder::Ascending => {
                        text.push_str("\nRows on this statement are dated oldest first.")
                    }
                    DateOrder::Descending => text.push_str(
                        "\nRows on this statement are dated newest first: check balances bottom-up.",
                    ),
                    DateOrder::Unknown => {}
                }
                text
            }
        }
    }
}

/// What a page contributes to a prompt.
#[derive(Debug, Clone)]
pub enum PromptContent {
    /// A base64-encoded raster of the page or of its table region.
    Image(ImageData),
    /// A table grid read from the page's text layer, one row per line.
    TableText(String),
}

/// A complete request for a vision provider.
#[derive(Debug, Clone)]
pub struct Prompt {
    pub text: String,
    pub image: Option<ImageData>,
    /// The instructions ask for a single top-level JSON object, so a
    /// provider's strict JSON-object mode is safe to enable.
    pub expects_object: bool,
}

impl Prompt {
    pub fn has_image(&self) -> bool {
        self.image.is_some()
    }
}

/// Build the extraction prompt for one page.
///
/// Deterministic: the same kind, content, override and schema always
/// produce the same prompt text. The schema only affects bank templates;
/// a caller override is used verbatim.
pub fn build_prompt(
    kind: DocumentKind,
    content: PromptContent,
    instructions_override: Option<&str>,
    schema: Option<&ColumnSchema>,
) -> Prompt {
    let (instructions, expects_object) = match instructions_override {
        Some(custom) => (custom.to_string(), false),
        None => (PromptTemplate::for_kind(kind).render(schema), true),
    };
    with_content(instructions, content, expects_object)
}

/// Build the column-order question for the first bank transaction table.
pub fn schema_prompt(content: PromptContent) -> Prompt {
    with_content(SCHEMA_PROMPT.to_string(), content, false)
}

/// Build the yes/no table classification prompt for one page image.
pub fn table_check_prompt(image: ImageData) -> Prompt {
    Prompt {
        text: TABLE_CHECK_PROMPT.to_string(),
        image: Some(image),
        expects_object: false,
    }
}

fn with_content(instructions: String, content: PromptContent, expects_object: bool) -> Prompt {
    match content {
        PromptContent::Image(image) => Prompt {
            text: instructions,
            image: Some(image),
            expects_object,
        },
        PromptContent::TableText(table) => Prompt {
            text: format!(
                "{instructions}\n\nThe table below was read from the page; cells are separated by '|'.\n\n{table}"
            ),
            image: None,
            expects_object,
        },
    }
}
