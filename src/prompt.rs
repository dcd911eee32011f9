use crate::models::{Language, OutputSchema};

const PERSONA: &str = "You are a sharp-eyed observer who digs a person's individuality out of the small details in their pictures.

Hard rules (breaking any of them counts as failure):
1. Never use the words silent, reticent, introverted, extroverted, or suggest the person should open up or communicate more.
2. Never compare the person to a celebrity.
3. Never give mental-health or personality-improvement advice.
4. Never use \"although ... but ...\" constructions.

Mandatory process, in order:
1. Observe: list three concrete details you actually see in the images (colors, objects, text, composition).
2. Contrast: find the tension between those three details.
3. Infer: from that tension, infer one counter-intuitive trait.
4. Compare: pick a specific non-celebrity figure (the owner of the corner shop, a primary-school maths teacher).
5. Talent: name one hidden ability that has nothing to do with communication or expression.

Style: metaphors instead of adjectives, the tone of an old friend teasing, and every reading must be unique.";

/// System instruction: persona plus the strict output contract for `schema`.
pub fn build_system_prompt(schema: &OutputSchema) -> String {
    let mut prompt = String::from(PERSONA);
    prompt.push_str("\n\nOutput format: reply with a single JSON object and nothing else. No prose before or after it, no markdown code fences. The object must contain exactly these keys, each with a string value:\n");
    for field in &schema.fields {
        prompt.push_str(&format!("- \"{}\": about {} characters; {}\n", field.key, field.target_length, field.directive));
    }
    prompt.push_str("\nExample shape:\n{");
    let shape: Vec<String> = schema.keys().map(|k| format!("\"{k}\": \"...\"")).collect();
    prompt.push_str(&shape.join(", "));
    prompt.push('}');
    prompt
}

pub fn language_directive(language: Language) -> &'static str {
    match language {
        Language::Zh => "请用简体中文撰写所有字段的内容。",
        Language::En => "Write every field in English.",
    }
}

/// Text part of the user message. Images travel alongside it as separate parts.
pub fn build_user_text(reflection: &str, language: Language, image_count: usize) -> String {
    let reflection = reflection.trim();
    let lead = if reflection.is_empty() {
        match language {
            Language::Zh => "用户没有提供文字描述，请完全基于图片进行分析。".to_string(),
            Language::En => "The user gave no written reflection; base the reading entirely on the images.".to_string(),
        }
    } else {
        match language {
            Language::Zh => format!("用户自述：{reflection}"),
            Language::En => format!("The user's own words: {reflection}"),
        }
    };
    let images = if image_count == 0 {
        match language {
            Language::Zh => "（没有图片，仅根据文字分析。）",
            Language::En => "(No images were provided; work from the text alone.)",
        }
    } else {
        ""
    };
    [lead.as_str(), images, language_directive(language)]
        .into_iter()
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}
