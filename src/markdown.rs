use pulldown_cmark::{Event, Options, Parser, Tag, TagEnd};

/// A run of inline text with uniform styling.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Fragment {
    pub text: String,
    pub bold: bool,
    pub link: Option<String>,
}

/// Script bodies carry a small inline-markdown subset: emphasis and
/// links. Block structure is flattened; a chat bubble is one paragraph.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Inline {
    pub fragments: Vec<Fragment>,
}

impl Inline {
    pub fn plain(&self) -> String {
        self.fragments
            .iter()
            .map(|f| f.text.as_str())
            .collect::<Vec<_>>()
            .join("")
    }

    pub fn links(&self) -> impl Iterator<Item = &str> {
        self.fragments
            .iter()
            .filter_map(|f| f.link.as_deref())
    }
}

pub fn render_inline(input: &str) -> Inline {
    let parser = Parser::new_ext(input, Options::empty());
    let mut fragments: Vec<Fragment> = Vec::new();
    let mut bold_depth = 0usize;
    let mut link_target: Option<String> = None;

    let mut push = |text: &str, bold: bool, link: &Option<String>| {
        if text.is_empty() {
            return;
        }
        // Merge runs that share a style so wrapping sees whole phrases.
        if let Some(last) = fragments.last_mut() {
            if last.bold == bold && last.link == *link {
                last.text.push_str(text);
                return;
            }
        }
        fragments.push(Fragment {
            text: text.to_string(),
            bold,
            link: link.clone(),
        });
    };

    for event in parser {
        match event {
            Event::Start(Tag::Strong) => bold_depth += 1,
            Event::End(TagEnd::Strong) => bold_depth = bold_depth.saturating_sub(1),
            Event::Start(Tag::Link { dest_url, .. }) => {
                link_target = Some(dest_url.to_string());
            }
            Event::End(TagEnd::Link) => link_target = None,
            Event::Text(text) | Event::Code(text) => {
                push(&text, bold_depth > 0, &link_target);
            }
            Event::SoftBreak | Event::HardBreak => push(" ", bold_depth > 0, &link_target),
            _ => {}
        }
    }

    Inline { fragments }
}
