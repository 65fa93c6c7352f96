//! Prompt construction from the configurable review template
//!
//! The admin-editable template carries `{productName}`, `{category}`,
//! `{minLength}` and `{maxLength}` placeholders. Unknown placeholders are
//! left untouched so a typo in the template is visible in the output instead
//! of silently vanishing.

use crate::config::PromptSettings;
use crate::models::Product;

/// Render the user prompt for a product review
pub fn build_review_prompt(product: &Product, prompt: &PromptSettings) -> String {
    let category = product.category_name.as_deref().unwrap_or("일반");

    prompt
        .review_template
        .replace("{productName}", &product.product_name)
        .replace("{category}", category)
        .replace("{minLength}", &prompt.min_length.to_string())
        .replace("{maxLength}", &prompt.max_length.to_string())
}
