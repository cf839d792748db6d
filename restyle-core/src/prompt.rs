//! Prompt composition for the remote image model.

use crate::styles::StyleDefinition;

pub struct PromptBuilder;

impl PromptBuilder {
    /// Instruction text for restyling image 1 against the image 2 background.
    ///
    /// Deterministic: the same style always yields the same text.
    pub fn build(style: &StyleDefinition) -> String {
        format!(
            "Task:\n\
             - Transform the entire Image 1 into {name} anime style.\n\
             - Preserve the original composition, background, and all details of Image 1.\n\
             - Do not extract the subject or remove the background.\n\
             - Use Image 2 as a style/tone reference if applicable, otherwise focus on Image 1.\n\
             - Place the subject naturally into the Image 2 background.\n\
             \n\
             Style Details:\n\
             {positive}\n\
             \n\
             Avoid:\n\
             {negative}\n",
            name = style.display_name,
            positive = style.positive,
            negative = style.negative,
        )
    }
}
