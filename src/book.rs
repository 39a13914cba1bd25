/*!
 * Book model consumed by the preparation engine and the orchestrator.
 *
 * Container parsing and writing (FB2, EPUB, ...) live elsewhere; this module
 * only describes the tree they produce: flat metadata plus chapters, each an
 * ordered list of sections with recursive subsections.
 */

use serde::{Deserialize, Serialize};

/// A parsed book.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Book {
    /// Flat metadata
    #[serde(default)]
    pub metadata: Metadata,

    /// Chapters in reading order
    #[serde(default)]
    pub chapters: Vec<Chapter>,
}

/// Book metadata.
///
/// Only `title` and `description` are ever translated; the remaining fields
/// are identifiers or proper nouns and are carried through untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Metadata {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub authors: Vec<String>,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub publisher: String,
    /// Recorded language code of the book's text
    #[serde(default)]
    pub language: String,
    #[serde(default)]
    pub isbn: String,
    #[serde(default)]
    pub date: String,
}

/// A chapter.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chapter {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub sections: Vec<Section>,
}

/// A section node. Subsections form a tree.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Section {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub subsections: Vec<Section>,
}

impl Book {
    /// Create an empty book with the given title.
    pub fn new(title: &str) -> Self {
        Self {
            metadata: Metadata {
                title: title.to_string(),
                ..Default::default()
            },
            chapters: Vec::new(),
        }
    }

    /// Append a chapter, builder style.
    pub fn with_chapter(mut self, chapter: Chapter) -> Self {
        self.chapters.push(chapter);
        self
    }

    /// Full text of the book as fed to the analysis passes: a metadata header
    /// followed by every chapter with a numbered heading.
    pub fn extract_text(&self) -> String {
        let mut content = String::new();

        content.push_str(&format!("Title: {}\n", self.metadata.title));
        if !self.metadata.authors.is_empty() {
            content.push_str(&format!("Authors: {}\n", self.metadata.authors.join(", ")));
        }
        content.push_str("\n---\n\n");

        for (i, chapter) in self.chapters.iter().enumerate() {
            content.push_str(&format!("\n\n## Chapter {}", i + 1));
            if !chapter.title.is_empty() {
                content.push_str(&format!(": {}", chapter.title));
            }
            content.push_str("\n\n");
            content.push_str(&chapter.text());
        }

        content
    }

    /// A bounded sample of the book's text for language identification:
    /// the first non-empty chapter, falling back to the description.
    pub fn language_sample(&self, max_chars: usize) -> String {
        let sample = self
            .chapters
            .iter()
            .map(Chapter::text)
            .find(|text| !text.trim().is_empty())
            .unwrap_or_else(|| self.metadata.description.clone());

        sample.chars().take(max_chars).collect()
    }

    /// Total number of sections, subsections included.
    pub fn section_count(&self) -> usize {
        self.chapters
            .iter()
            .flat_map(|c| c.sections.iter())
            .map(Section::node_count)
            .sum()
    }
}

impl Chapter {
    /// Create a chapter with the given title and no sections.
    pub fn new(title: &str) -> Self {
        Self {
            title: title.to_string(),
            sections: Vec::new(),
        }
    }

    /// Append a section, builder style.
    pub fn with_section(mut self, section: Section) -> Self {
        self.sections.push(section);
        self
    }

    /// Body text of the chapter, depth-first across all sections.
    pub fn text(&self) -> String {
        let mut content = String::new();
        for section in &self.sections {
            section.write_text(&mut content);
        }
        content
    }
}

impl Section {
    /// Create a section with content only.
    pub fn new(content: &str) -> Self {
        Self {
            title: String::new(),
            content: content.to_string(),
            subsections: Vec::new(),
        }
    }

    /// Set the title, builder style.
    pub fn titled(mut self, title: &str) -> Self {
        self.title = title.to_string();
        self
    }

    /// Append a subsection, builder style.
    pub fn with_subsection(mut self, section: Section) -> Self {
        self.subsections.push(section);
        self
    }

    fn write_text(&self, out: &mut String) {
        if !self.content.is_empty() {
            out.push_str(&self.content);
            out.push_str("\n\n");
        }
        for sub in &self.subsections {
            sub.write_text(out);
        }
    }

    fn node_count(&self) -> usize {
        1 + self.subsections.iter().map(Section::node_count).sum::<usize>()
    }
}
