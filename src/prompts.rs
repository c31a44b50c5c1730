//! Masked prompts for the Dunlosky category norms
//!
//! One prompt per category, in the order the categories appear in the
//! norms table.

/// Placeholder a prompt uses for the position to predict
pub const MASK_PLACEHOLDER: &str = "<MASK>";

/// Indefinite-article forms re-queried for "a <MASK>" prompts
pub const INDEFINITE_ARTICLE: &str = "a <MASK>";
pub const INDEFINITE_ARTICLE_VOWEL: &str = "an <MASK>";

pub const DUNLOSKY_PROMPTS: [&str; 56] = [
    "a <MASK> is a precious stone",
    "a <MASK> is a unit of time",
    "<MASK> is a relative",
    "a <MASK> is a unit of distance",
    "<MASK> is a metal",
    "a <MASK> is a type of reading material",
    "<MASK> is a military title",
    "a <MASK> is a four-footed animal",
    "a <MASK> is a type of fabric",
    "<MASK> is a color",
    "a <MASK> is a kitchen utensil",
    "a <MASK> is a building for religious services",
    "a <MASK> is a part of speech",
    "a <MASK> is an article of furniture",
    "a <MASK> is a part of the human body",
    "a <MASK> is a fruit",
    "a <MASK> is a weapon",
    "a <MASK> is an elective office",
    "a <MASK> is a type of human dwelling",
    "<MASK> is an alcoholic beverage",
    "<MASK> is a country",
    "<MASK> is a crime",
    "a <MASK> is a carpenter tool",
    "a <MASK> is a member of the clergy",
    "a <MASK> is a substance for flavoring food",
    "<MASK> is a fuel",
    "a <MASK> is an occupation or profession",
    "a <MASK> is a natural earth formation",
    "<MASK> is a sport",
    "a <MASK> is a weather phenomenon",
    "a <MASK> is an article of clothing",
    "a <MASK> is a part of a building",
    "<MASK> is a chemical element",
    "a <MASK> is a musical instrument",
    "a <MASK> is a kind of money",
    "<MASK> is a type of music",
    "a <MASK> is a bird",
    "a <MASK> is a transportation vehicle",
    "<MASK> is a science",
    "a <MASK> is a toy",
    "the <MASK> is a type of dance",
    "a <MASK> is a vegetable",
    "a <MASK> is a type of footwear",
    "a <MASK> is an insect",
    "a <MASK> is a flower",
    "<MASK> is a disease",
    "a <MASK> is a tree",
    "a <MASK> is a type of ship or boat",
    "a <MASK> is a fish",
    "a <MASK> is a snake",
    "<MASK> is a city",
    "<MASK> is a state",
    "<MASK> is a drug",
    "a <MASK> is a type of car",
    "<MASK> is a liquid",
    "a <MASK> is a thing women wear",
];

pub fn dunlosky_prompts() -> Vec<&'static str> {
    DUNLOSKY_PROMPTS.to_vec()
}

/// True if the prompt's mask follows the article "a"
pub fn has_indefinite_article(prompt: &str) -> bool {
    prompt.contains(INDEFINITE_ARTICLE)
}

/// The "a <MASK>" and "an <MASK>" forms of a prompt
pub fn article_variants(prompt: &str) -> [String; 2] {
    [
        prompt.to_string(),
        prompt.replace(INDEFINITE_ARTICLE, INDEFINITE_ARTICLE_VOWEL),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_prompt_has_one_mask() {
        for prompt in DUNLOSKY_PROMPTS {
            assert_eq!(prompt.matches(MASK_PLACEHOLDER).count(), 1, "{prompt}");
        }
    }

    #[test]
    fn test_article_variants() {
        let [a, an] = article_variants("a <MASK> is a fruit");
        assert_eq!(a, "a <MASK> is a fruit");
        assert_eq!(an, "an <MASK> is a fruit");
        assert!(has_indefinite_article(&a));
        assert!(!has_indefinite_article("the <MASK> is a type of dance"));
        assert!(!has_indefinite_article("<MASK> is a color"));
    }
}
