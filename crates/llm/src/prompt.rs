//! Prompt text sent to the model.

use pipeline::generation::GenerationRequest;

/// System message for adjudication calls.
pub const REVIEWER_SYSTEM_PROMPT: &str =
    "You are a strict but fair reviewer for an open-source website directory.";

/// Builds the user prompt that expands a bare URL into a catalog entry.
///
/// The response is requested as a JSON object; whatever comes back is still
/// validated by the pipeline before it reaches the catalog.
pub fn generation_prompt(request: &GenerationRequest) -> String {
    let policy = serde_json::to_string_pretty(&request.policy).unwrap_or_else(|_| "{}".to_string());
    let categories = request.allowed_categories.join(", ");
    let lenses = request.allowed_lenses.join(", ");

    format!(
        "Generate a complete catalog entry for a website directory from a URL. \
You must return your response as valid JSON.

URL: {url}

Policy: {policy}

Allowed categories: {categories}
Allowed lenses: {lenses}

Instructions:
1. Analyze the URL to understand what the website is
2. Use `{slug}` as the id
3. Choose the most appropriate category from the allowed list
4. Select 0-4 relevant lenses from the allowed list
5. Assess quality: exceptional (unusually high quality), solid (reliable/established), or niche (specific audience)
6. Write a clear, factual title
7. Write a one-sentence description (max 160 chars), factual, no marketing fluff

Return your response as a JSON object with these fields:
- id (string): `{slug}`
- url (string): exactly `{url}`
- category (string): exactly one of: {categories}
- lenses (array of strings, 0-4 items): from: {lenses}
- quality (string): \"exceptional\", \"solid\", or \"niche\"
- title (object): {{\"en\": \"English title\"}}
- description (object): {{\"en\": \"English description\"}}

Return ONLY valid JSON, no markdown formatting, no code blocks.",
        url = request.url,
        slug = request.slug,
    )
}
