use ego_tree::NodeRef;
use scraper::node::Node;
use scraper::{ElementRef, Html};

/// Visible text of a whole parsed document; `<head>` contributes nothing.
pub fn document_text(document: &Html) -> String {
    element_text(document.root_element())
}

/// Visible text below `element`: whitespace collapsed, one line per block element.
pub fn element_text(element: ElementRef) -> String {
    let mut ctx = TextContext::default();
    visit_children(element, &mut ctx);
    ctx.into_text()
}

fn visit_node(node: NodeRef<'_, Node>, ctx: &mut TextContext) {
    match node.value() {
        Node::Text(text) => ctx.append_text(text),
        Node::Element(_) => {
            if let Some(element) = ElementRef::wrap(node) {
                visit_element(element, ctx);
            }
        }
        Node::Comment(_) | Node::ProcessingInstruction(_) | Node::Doctype(_) => {}
        _ => {
            for child in node.children() {
                visit_node(child, ctx);
            }
        }
    }
}

fn visit_element(element: ElementRef, ctx: &mut TextContext) {
    let tag = element.value().name().to_ascii_lowercase();
    match tag.as_str() {
        "script" | "style" | "noscript" | "iframe" | "template" | "head" | "svg" => {
            // no visible text
        }
        "br" => ctx.ensure_newline(),
        "p" | "div" | "section" | "article" | "header" | "footer" | "nav" | "figure"
        | "figcaption" | "table" | "tr" | "td" | "th" | "blockquote" | "address" | "li"
        | "ul" | "ol" | "h1" | "h2" | "h3" | "h4" | "h5" | "h6" | "main" | "aside" | "pre"
        | "hr" => {
            ctx.ensure_newline();
            visit_children(element, ctx);
            ctx.ensure_newline();
        }
        _ => visit_children(element, ctx),
    }
}

fn visit_children(element: ElementRef, ctx: &mut TextContext) {
    for child in element.children() {
        visit_node(child, ctx);
    }
}

#[derive(Default)]
struct TextContext {
    builder: String,
    last_char: Option<char>,
}

impl TextContext {
    fn into_text(self) -> String {
        self.builder
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .collect::<Vec<_>>()
            .join("\n")
    }

    fn append_text(&mut self, text: &str) {
        for ch in text.chars() {
            if ch.is_whitespace() {
                if self.last_char.is_none()
                    || self.last_char == Some(' ')
                    || self.last_char == Some('\n')
                {
                    continue;
                }
                self.push_char(' ');
            } else {
                self.push_char(ch);
            }
        }
    }

    fn ensure_newline(&mut self) {
        if self.last_char == Some('\n') || self.builder.is_empty() {
            return;
        }
        self.push_char('\n');
    }

    fn push_char(&mut self, ch: char) {
        self.builder.push(ch);
        self.last_char = Some(ch);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_script_and_style() {
        let html = r#"<html><head><title>T</title><style>p { color: red }</style></head>
            <body><script>var x = 1;</script><p>Hello   <b>world</b></p><p>Second</p></body></html>"#;
        assert_eq!(document_text(&Html::parse_document(html)), "Hello world\nSecond");
    }

    #[test]
    fn collapses_whitespace_across_inline_elements() {
        let html = "<body><span>a</span>\n\n  <span>b</span><br>c</body>";
        assert_eq!(document_text(&Html::parse_document(html)), "a b\nc");
    }
}
