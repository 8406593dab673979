//! Content record — the unit of work for an optimization session.
//!
//! A `Content` is owned by the optimizer for the duration of one session and
//! persisted externally only at session end. Optional fields carry explicit
//! defaults at construction time; downstream rule checks treat a missing
//! optional field as a failing rule, never as a panic.

use serde::{Deserialize, Serialize};

/// A planned or attached image with its generation prompt and alt text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImagePrompt {
    /// Generation prompt describing the image.
    pub prompt: String,
    /// Alt text. Empty string means "not yet written".
    #[serde(default)]
    pub alt: String,
}

impl ImagePrompt {
    pub fn new(prompt: impl Into<String>, alt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            alt: alt.into(),
        }
    }
}

/// A mutable blog-content record moving through the optimization loop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Content {
    /// Post title.
    pub title: String,
    /// HTML-ish body text.
    pub body: String,
    /// Search-result meta description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta_description: Option<String>,
    /// Primary keyword this content targets.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub focus_keyword: Option<String>,
    /// Supporting keywords.
    #[serde(default)]
    pub secondary_keywords: Vec<String>,
    /// Hand-written or generated excerpt.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub excerpt: Option<String>,
    /// URL slug.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub slug: Option<String>,
    /// Taxonomy tags.
    #[serde(default)]
    pub tags: Vec<String>,
    /// Image prompts with alt text.
    #[serde(default)]
    pub image_prompts: Vec<ImagePrompt>,
    /// Internal link targets (slugs or URLs).
    #[serde(default)]
    pub internal_links: Vec<String>,
}

impl Content {
    /// Start building a content record from its two required fields.
    pub fn builder(title: impl Into<String>, body: impl Into<String>) -> ContentBuilder {
        ContentBuilder::new(title, body)
    }

    /// Body text with HTML tags stripped, for word-level analysis.
    pub fn plain_text(&self) -> String {
        strip_tags(&self.body)
    }

    /// Word count of the stripped body.
    pub fn word_count(&self) -> usize {
        self.plain_text().split_whitespace().count()
    }
}

/// Builder that pins down defaults for every optional field up front.
#[derive(Debug, Clone)]
pub struct ContentBuilder {
    content: Content,
}

impl ContentBuilder {
    pub fn new(title: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            content: Content {
                title: title.into(),
                body: body.into(),
                meta_description: None,
                focus_keyword: None,
                secondary_keywords: Vec::new(),
                excerpt: None,
                slug: None,
                tags: Vec::new(),
                image_prompts: Vec::new(),
                internal_links: Vec::new(),
            },
        }
    }

    pub fn meta_description(mut self, meta: impl Into<String>) -> Self {
        self.content.meta_description = Some(meta.into());
        self
    }

    pub fn focus_keyword(mut self, keyword: impl Into<String>) -> Self {
        self.content.focus_keyword = Some(keyword.into());
        self
    }

    pub fn secondary_keywords(mut self, keywords: Vec<String>) -> Self {
        self.content.secondary_keywords = keywords;
        self
    }

    pub fn excerpt(mut self, excerpt: impl Into<String>) -> Self {
        self.content.excerpt = Some(excerpt.into());
        self
    }

    pub fn slug(mut self, slug: impl Into<String>) -> Self {
        self.content.slug = Some(slug.into());
        self
    }

    pub fn tags(mut self, tags: Vec<String>) -> Self {
        self.content.tags = tags;
        self
    }

    pub fn image_prompt(mut self, image: ImagePrompt) -> Self {
        self.content.image_prompts.push(image);
        self
    }

    pub fn internal_links(mut self, links: Vec<String>) -> Self {
        self.content.internal_links = links;
        self
    }

    pub fn build(self) -> Content {
        self.content
    }
}

/// Replace HTML tags with spaces so adjacent words don't fuse.
pub fn strip_tags(html: &str) -> String {
    use once_cell::sync::Lazy;
    use regex::Regex;

    static TAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"<[^>]*>").unwrap());
    let spaced = TAG.replace_all(html, " ");
    spaced.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// The field of a content record a rule or correction targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentField {
    Title,
    Body,
    MetaDescription,
    ImageAlt,
}

impl std::fmt::Display for ContentField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Title => write!(f, "title"),
            Self::Body => write!(f, "body"),
            Self::MetaDescription => write!(f, "meta_description"),
            Self::ImageAlt => write!(f, "image_alt"),
        }
    }
}

impl ContentField {
    /// Read the current value of this field from a content record.
    ///
    /// `ImageAlt` joins all alt texts; an empty string means "absent".
    pub fn read<'a>(&self, content: &'a Content) -> std::borrow::Cow<'a, str> {
        use std::borrow::Cow;
        match self {
            Self::Title => Cow::Borrowed(&content.title),
            Self::Body => Cow::Borrowed(&content.body),
            Self::MetaDescription => {
                Cow::Borrowed(content.meta_description.as_deref().unwrap_or(""))
            }
            Self::ImageAlt => Cow::Owned(
                content
                    .image_prompts
                    .iter()
                    .map(|i| i.alt.as_str())
                    .collect::<Vec<_>>()
                    .join(" | "),
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_defaults() {
        let content = Content::builder("Title", "<p>Body</p>").build();
        assert_eq!(content.title, "Title");
        assert!(content.meta_description.is_none());
        assert!(content.secondary_keywords.is_empty());
        assert!(content.image_prompts.is_empty());
    }

    #[test]
    fn test_strip_tags_separates_words() {
        let html = "<h2>Heading</h2><p>First sentence.</p><p>Second.</p>";
        let plain = strip_tags(html);
        assert_eq!(plain, "Heading First sentence. Second.");
    }

    #[test]
    fn test_word_count() {
        let content = Content::builder("T", "<p>one two three</p><p>four</p>").build();
        assert_eq!(content.word_count(), 4);
    }

    #[test]
    fn test_field_read_missing_meta_is_empty() {
        let content = Content::builder("T", "b").build();
        assert_eq!(ContentField::MetaDescription.read(&content), "");
    }

    #[test]
    fn test_field_read_image_alt_joined() {
        let content = Content::builder("T", "b")
            .image_prompt(ImagePrompt::new("a cat", "tabby cat on a desk"))
            .image_prompt(ImagePrompt::new("a dog", ""))
            .build();
        assert_eq!(
            ContentField::ImageAlt.read(&content),
            "tabby cat on a desk | "
        );
    }

    #[test]
    fn test_content_json_roundtrip() {
        let content = Content::builder("SEO Guide", "<p>Body text here.</p>")
            .meta_description("A description")
            .focus_keyword("seo")
            .tags(vec!["guide".into()])
            .build();
        let json = serde_json::to_string(&content).unwrap();
        let restored: Content = serde_json::from_str(&json).unwrap();
        assert_eq!(restored, content);
    }
}
