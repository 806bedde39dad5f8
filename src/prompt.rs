//! Prompt assembly for the downstream generator.
//!
//! The engine does not call the generator; it only renders the prompt that
//! pairs the retrieved context with the manufacturer/model/attribute fields.
//! Callers may pass their own template; placeholders are `{hits}`,
//! `{manufacturer}`, `{model_number}`, and `{query_attr}`.

/// Default attribute-extraction template.
pub const DEFAULT_PROMPT_TEMPLATE: &str = "\
You are a retrieval-augmented assistant.
Follow the rules strictly:
- Extract the most relevant values for the target attribute.
- Match Manufacturer and Model Number if provided.
- Return up to 3 candidate answers.
- Do NOT add explanations or commentary.
- Format strictly as: <value> (<confidence>%) [Reference: <source.pdf> page <page> line <line>]

---

context:
{hits}

manufacturer: {manufacturer}
model number: {model_number}
query_attr: {query_attr}
";

/// Substitute the retrieval fields into a template.
///
/// `template` falls back to [`DEFAULT_PROMPT_TEMPLATE`] when `None`.
///
/// # Examples
///
/// ```
/// use attrieve::prompt::render_prompt;
///
/// let prompt = render_prompt(None, "ctx", "Fujitec", "EXDN", "Rated Load");
/// assert!(prompt.contains("context:\nctx"));
/// assert!(prompt.contains("manufacturer: Fujitec"));
/// ```
pub fn render_prompt(
    template: Option<&str>,
    context: &str,
    manufacturer: &str,
    model_number: &str,
    query_attr: &str,
) -> String {
    template
        .unwrap_or(DEFAULT_PROMPT_TEMPLATE)
        .replace("{hits}", context)
        .replace("{manufacturer}", manufacturer)
        .replace("{model_number}", model_number)
        .replace("{query_attr}", query_attr)
}
