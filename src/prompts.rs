//! System prompts for document classification and analysis.
//!
//! Every prompt the pipeline sends lives here so prompt changes never touch
//! retry or orchestration code, and unit tests can inspect the exact text
//! the model receives. Each prompt pins down the JSON shape the
//! corresponding call expects back.

use crate::output::FileInfo;

/// Classification prompt. The model answers with a single `document_type` key.
pub const CLASSIFICATION_PROMPT: &str = r#"Analyze the following text to identify the document type. Respond ONLY with a JSON object
containing a single 'document_type' key. Choose from: 'Invoice', 'BalanceSheet',
'ProfitAndLossStatement', 'Contract', 'GeneralDocument'.
Example: {"document_type": "Invoice"}"#;

/// Single-document analysis prompt.
pub const ANALYSIS_PROMPT: &str = r#"You are an expert document analysis AI specializing in providing detailed summaries and actionable recommendations. Your task is to analyze the following text and provide a structured JSON response.

IMPORTANT: Focus on providing SPECIFIC, DETAILED summaries and recommendations rather than general statements. For example:
- Instead of "Settle outstanding invoices promptly", provide "Pay invoice 250270334 for €91.25 issued by KvK by December 15th"
- Instead of "Review contract terms", provide "Contract expires on 2024-12-31, renewal fee is €500/month, contact legal team for review"

Perform the following actions:
1. Detect the document's 'language' (e.g., 'English', 'Dutch', 'Spanish')
2. Identify the document's 'document_type' (e.g., 'Invoice', 'BalanceSheet', 'Contract', 'GeneralDocument')
3. Provide a 'detailed_summary' - comprehensive summary with specific details, amounts, dates, and entities
4. Provide 'actionable_recommendations' - specific, detailed recommendations with exact details and next steps
5. Include 'key_details' - only the most important extracted information that supports the summary and recommendations

Respond ONLY with a valid JSON object in this exact structure:

{
  "language": "<Detected Language>",
  "document_type": "<Document Type>",
  "detailed_summary": "Comprehensive summary with specific details, amounts, dates, company names, and exact information from the document",
  "actionable_recommendations": [
    "Specific recommendation 1 with exact details (e.g., 'Pay invoice 250270334 for €91.25 issued by KvK by December 15th')",
    "Specific recommendation 2 with exact details (e.g., 'Contact John Smith at john@company.com regarding contract renewal by November 30th')",
    "Specific recommendation 3 with exact details (e.g., 'Verify purchase order PO-2024-001 matches invoice amount of €2,450.00')"
  ],
  "key_details": {
    "Important_Field_1": "Exact Value 1",
    "Important_Field_2": "Exact Value 2"
  }
}

Rules:
- Focus on providing detailed, specific information in summaries and recommendations
- Include exact amounts, dates, invoice numbers, company names, and other specific details
- Make recommendations immediately actionable with specific next steps
- Keep key_details minimal - only include information that directly supports the summary and recommendations
- Avoid vague statements like "settle promptly" or "review terms"
- Provide concrete, actionable guidance with exact details"#;

/// System message for the consolidated multi-document call.
pub const CONSOLIDATED_SYSTEM_PROMPT: &str = "You are an expert document analyst specializing in multi-document analysis and providing detailed summaries with actionable recommendations. Focus on specific details and concrete guidance.";

/// Prompt for transcribing an uploaded image before classification.
pub const OCR_PROMPT: &str = r#"You are an OCR engine. Transcribe ALL text visible in the image exactly as written.

- Preserve reading order, line breaks, and numbers (amounts, dates, IDs) verbatim
- Render tables as rows with cells separated by " | "
- Do NOT summarise, translate, or add commentary
- If the image contains no text, reply with an empty message"#;

/// Literal placed between documents in the consolidated combined text.
pub const DOCUMENT_SEPARATOR: &str = "\n\n--- DOCUMENT SEPARATOR ---\n\n";

/// Analysis system prompt with the classifier's verdict appended as context.
pub fn analysis_system_prompt(document_type: &str) -> String {
    format!(
        "{ANALYSIS_PROMPT}\n\nThe document was pre-classified as: {document_type}. \
Use this as a hint, but report the type you actually observe."
    )
}

/// Build the user message for the consolidated call.
///
/// `file_info_json` is the pretty-printed per-file metadata; `combined_text`
/// must already be truncated by the caller.
pub fn consolidated_prompt(files: &[FileInfo], file_info_json: &str, combined_text: &str) -> String {
    let n = files.len();
    format!(
        r#"You are an expert document analyst specializing in providing detailed summaries and actionable recommendations. You have been given {n} documents to analyze together.

Your task is to provide a comprehensive analysis with detailed summaries and specific, actionable recommendations:

1. **Comprehensive Summary**: Detailed summary of all documents combined with specific details, amounts, dates, and entities
2. **Key Findings**: Specific, actionable findings from the document collection
3. **Detailed Recommendations**: Specific, actionable recommendations with exact details and next steps
4. **Priority Actions**: Most urgent or important actions that need immediate attention with specific details

Document Information:
{file_info_json}

Please provide a clean JSON response with these fields:
{{
    "comprehensive_summary": "Detailed summary of all documents combined with specific details, amounts, dates, company names, and exact information",
    "key_findings": [
        "Specific finding 1 with exact details",
        "Specific finding 2 with exact details"
    ],
    "detailed_recommendations": [
        "Specific recommendation 1 with exact details (e.g., 'Pay invoice 250270334 for €91.25 issued by KvK by December 15th')",
        "Specific recommendation 2 with exact details (e.g., 'Contact legal team regarding contract ABC-2024-001 renewal by November 30th')",
        "Specific recommendation 3 with exact details (e.g., 'Verify purchase order PO-2024-001 matches invoice amount of €2,450.00')"
    ],
    "priority_actions": [
        "Most urgent action 1 with exact details and deadlines",
        "Most urgent action 2 with exact details and deadlines"
    ]
}}

Analyze the following combined text from all documents:
{combined_text}

IMPORTANT: Focus on providing SPECIFIC, DETAILED summaries and recommendations rather than general statements. Include exact invoice numbers, amounts, company names, dates, and other specific details that make the recommendations immediately actionable."#
    )
}
