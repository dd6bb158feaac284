//! Prompt templates for every model call the crate makes.
//!
//! Centralising the wording here keeps it out of the pipeline logic:
//!
//! 1. **Single source of truth**: changing what the model is told (e.g. a
//!    new placeholder rule) means editing exactly one place.
//!
//! 2. **Testability**: unit tests inspect the built prompts directly, so a
//!    lost instruction or a reordered fragment shows up without a live model.
//!
//! Every template restates the placeholder grammar (`xxxx_` followed by
//! uppercase letters, digits and underscores) because each call may emit
//! document content.

/// Instruction shared by every prompt that produces contract content.
pub const PLACEHOLDER_RULE: &str = "Replace every concrete, case-specific value (party names, \
addresses, dates, amounts, durations, reference numbers) with a descriptive placeholder of the \
form xxxx_VARIABLE_NAME: the literal prefix xxxx_ followed only by uppercase letters, digits and \
underscores (e.g. xxxx_CLIENT_NAME, xxxx_START_DATE, xxxx_MONTHLY_FEE). Reuse the same \
placeholder wherever the same value appears.";

/// Build the extraction prompt for one batch of page images.
///
/// `chunk_index` is 0-based; the prompt numbers parts from 1.
pub fn extraction_prompt(chunk_index: usize, total_chunks: usize, page_count: usize) -> String {
    let pages = if page_count == 1 {
        "The attached image is one page".to_string()
    } else {
        format!("The {page_count} attached images are consecutive pages, in order,")
    };
    format!(
        r#"{pages} of part {part} of {total} of a larger contract.

Reconstruct the visible text exactly as seen, as clean semantic HTML
(headings, paragraphs, ordered and unordered lists, tables).

Rules:
1. {rule}
2. Preserve clause numbering and reading order.
3. Ignore page numbers, scan artefacts and decorative rules.
4. Focus only on structure and content; do not add styling.

Return ONLY the HTML snippet. No markdown fences, no commentary."#,
        pages = pages,
        part = chunk_index + 1,
        total = total_chunks.max(1),
        rule = PLACEHOLDER_RULE,
    )
}

/// Build the synthesis prompt.
///
/// Fragments are joined with a blank line in the order given; the model is
/// told that earlier parts win when headers or footers repeat.
pub fn synthesis_prompt(fragments: &[String]) -> String {
    let combined = fragments.join("\n\n");
    format!(
        r#"You have analysed a legacy contract in {count} part(s). Here is the raw HTML
extracted from every part, in page order:

{combined}

Task:
1. Stitch these parts into a single, cohesive, professional contract template.
2. Standardise the HTML structure: one <h1> title, <h2>/<h3> for sections,
   <p> for prose, <ol>/<ul> for enumerations.
3. Ensure every placeholder follows the xxxx_VARIABLE_NAME format consistently.
   {rule}
4. Remove duplicate headers and footers that appear in several parts; keep the
   earliest occurrence.
5. Return JSON: {{ "title": "A descriptive title", "html": "The full synthesized HTML" }}."#,
        count = fragments.len(),
        combined = combined,
        rule = PLACEHOLDER_RULE,
    )
}

/// Build the scoped-edit prompt. `compacted_html` should already be compacted.
pub fn edit_prompt(compacted_html: &str, instruction: &str, selection: Option<&str>) -> String {
    let scope = match selection {
        Some(sel) => format!(
            "Scope: Only change this specific text within the document: \"{}\". \
Leave everything else exactly as it is.",
            sel
        ),
        None => "Scope: Apply the change to the whole document where relevant.".to_string(),
    };
    format!(
        r#"Task: Modify the contract HTML based on the following instruction.
Instruction: "{instruction}"
{scope}

Keep existing xxxx_VARIABLE_NAME placeholders unless the instruction says
otherwise; any new placeholder must use the same format.

Document HTML:
{compacted_html}

Return ONLY the full updated HTML document. Do not include markdown blocks."#,
    )
}

/// Build the prompt that asks for wizard follow-up questions.
pub fn questions_prompt(
    object: &str,
    purpose: &str,
    client_name: &str,
    context: &str,
    count: usize,
) -> String {
    format!(
        r#"You are a senior legal counsel. Based on this context:
- Object: {object}
- Purpose: {purpose}
- Client: {client_name}
- Strategic context: {context}

Generate exactly {count} critical, specific and short follow-up questions for the
contract template. Focus on business risks, service levels and liability.
Return ONLY a valid JSON array of strings."#,
    )
}

/// Build the template-generation prompt.
///
/// `details` is the rendered question/answer list from the second wizard
/// phase.
pub fn template_prompt(object: &str, client_name: &str, format: &str, details: &str) -> String {
    format!(
        r#"Generate a professional contract template in HTML.
Inputs:
- Object: {object}
- Client: {client_name}
- Format: {format}
- Details: {details}

Requirements:
1. Professional legal structure with numbered articles.
2. {rule}
3. Return JSON: {{ "title": "...", "category": "...", "html": "..." }}."#,
        rule = PLACEHOLDER_RULE,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extraction_prompt_numbers_parts_from_one() {
        let p = extraction_prompt(0, 3, 3);
        assert!(p.contains("part 1 of 3"));
        assert!(p.contains("3 attached images"));
        assert!(p.contains("xxxx_"));
        assert!(p.contains("Return ONLY the HTML snippet"));
    }

    #[test]
    fn extraction_prompt_single_page_wording() {
        let p = extraction_prompt(2, 3, 1);
        assert!(p.contains("one page of part 3 of 3"));
    }

    #[test]
    fn synthesis_prompt_keeps_fragment_order() {
        let frags = vec!["<p>first</p>".to_string(), "<p>second</p>".to_string()];
        let p = synthesis_prompt(&frags);
        let a = p.find("<p>first</p>").unwrap();
        let b = p.find("<p>second</p>").unwrap();
        assert!(a < b);
        assert!(p.contains("<p>first</p>\n\n<p>second</p>"));
        assert!(p.contains("\"title\""));
        assert!(p.contains("\"html\""));
    }

    #[test]
    fn edit_prompt_scopes_to_selection() {
        let p = edit_prompt("<p>x</p>", "make it bold", Some("x"));
        assert!(p.contains("Only change this specific text"));
        assert!(p.contains("\"x\""));
        let p = edit_prompt("<p>x</p>", "make it bold", None);
        assert!(p.contains("whole document"));
    }

    #[test]
    fn questions_prompt_states_count() {
        let p = questions_prompt("Cloud hosting", "SLA", "Acme", "renewal", 5);
        assert!(p.contains("exactly 5"));
        assert!(p.contains("Acme"));
    }
}
