//! Markdown rendering for documentation pages.

/// Renders Markdown into HTML.
pub trait Markdown: Send + Sync {
    fn render(&self, source: &str) -> String;
}

/// Wraps the escaped source into a `<pre>` block.
#[derive(Debug, Default, Clone, Copy)]
pub struct Plain;

impl Markdown for Plain {
    fn render(&self, source: &str) -> String {
        let mut out = String::with_capacity(source.len() + 11);
        out.push_str("<pre>");
        for ch in source.chars() {
            match ch {
                '<' => out.push_str("&lt;"),
                '>' => out.push_str("&gt;"),
                '&' => out.push_str("&amp;"),
                '"' => out.push_str("&quot;"),
                _ => out.push(ch),
            }
        }
        out.push_str("</pre>");
        out
    }
}

#[cfg(feature = "markdown")]
#[derive(Debug, Default, Clone, Copy)]
pub struct Comrak;

#[cfg(feature = "markdown")]
impl Markdown for Comrak {
    fn render(&self, source: &str) -> String {
        let mut options = comrak::Options::default();
        options.extension.table = true;
        options.extension.strikethrough = true;
        comrak::markdown_to_html(source, &options)
    }
}

/// The renderer used when none is configured.
pub fn default_renderer() -> Box<dyn Markdown> {
    #[cfg(feature = "markdown")]
    return Box::new(Comrak);

    #[cfg(not(feature = "markdown"))]
    return Box::new(Plain);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_escapes() {
        assert_eq!(Plain.render("<a>&"), "<pre>&lt;a&gt;&amp;</pre>");
    }

    #[cfg(feature = "markdown")]
    #[test]
    fn test_comrak_renders_code() {
        let html = Comrak.render("```html\n<view/>\n```");
        assert!(html.contains("<code"));
        assert!(html.contains("&lt;view/&gt;"));
    }
}
