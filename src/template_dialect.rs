//! Accepts alertmanager style templates in tera.
//!
//! Alertmanager templates refer to fields relative to a leading dot
//! (`{{ .Labels.alertname }}`), tera expects bare identifiers
//! (`{{ Labels.alertname }}`). We drop the leading dot of every dot rooted
//! reference inside tera tags and leave everything else alone: plain text,
//! string literals, comments and `raw` blocks pass through unchanged.

use std::borrow::Cow;

/// Rewrites dot rooted references into bare tera identifiers.
pub fn normalize(source: &str) -> Cow<'_, str> {
	if !source.contains('.') {
		return Cow::Borrowed(source);
	}

	let mut out = String::with_capacity(source.len());
	let mut rest = source;
	let mut in_raw = false;

	while let Some(start) = rest.find('{') {
		let (text, tail) = rest.split_at(start);
		out.push_str(text);

		let close = match tail.get(..2) {
			Some("{{") => "}}",
			Some("{%") => "%}",
			Some("{#") => "#}",
			_ => {
				out.push('{');
				rest = &tail[1..];
				continue;
			}
		};

		let inner = &tail[2..];
		// raw block content isn't an expression, quotes in it don't pair up
		let end = if close == "#}" || in_raw { inner.find(close) } else { find_tag_end(inner, close) };

		// unterminated tag, let tera report it
		let Some(end) = end else {
			out.push_str(tail);
			return Cow::Owned(out);
		};

		let body = &inner[..end];
		let tag_len = 2 + end + close.len();

		if close == "#}" || (in_raw && !is_block(body, "endraw")) {
			out.push_str(&tail[..tag_len]);
		} else {
			out.push_str(&tail[..2]);
			strip_dot_roots(body, &mut out);
			out.push_str(close);

			if close == "%}" {
				if is_block(body, "raw") {
					in_raw = true;
				} else if is_block(body, "endraw") {
					in_raw = false;
				}
			}
		}

		rest = &tail[tag_len..];
	}

	out.push_str(rest);
	Cow::Owned(out)
}

/// byte offset of `close` in `inner`, skipping over string literals
fn find_tag_end(inner: &str, close: &str) -> Option<usize> {
	let mut quote = None;

	for (idx, c) in inner.char_indices() {
		match quote {
			Some(q) if c == q => quote = None,
			Some(_) => {}
			None if matches!(c, '"' | '\'' | '`') => quote = Some(c),
			None if inner[idx..].starts_with(close) => return Some(idx),
			None => {}
		}
	}

	None
}

/// whether a `{% .. %}` body is exactly the block keyword `name`
fn is_block(body: &str, name: &str) -> bool {
	body.trim().trim_matches('-').trim() == name
}

fn strip_dot_roots(body: &str, out: &mut String) {
	let mut quote = None;
	let mut prev = None;
	let mut chars = body.chars().peekable();

	while let Some(c) = chars.next() {
		match quote {
			Some(q) if c == q => quote = None,
			Some(_) => {}
			None if matches!(c, '"' | '\'' | '`') => quote = Some(c),
			None if c == '.' => {
				let roots_reference = !prev.map_or(false, continues_expression)
					&& chars.peek().map_or(false, |&next| next.is_alphabetic() || next == '_');

				if roots_reference {
					prev = Some(c);
					continue;
				}
			}
			None => {}
		}

		out.push(c);
		prev = Some(c);
	}
}

/// a dot after one of these is a member access, not a root
fn continues_expression(c: char) -> bool {
	c.is_alphanumeric() || matches!(c, '_' | ')' | ']' | '"' | '\'' | '`')
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn strips_leading_dots() {
		assert_eq!(
			normalize("Alert {{ .Labels.alertname }} on {{.Labels.instance}} is {{.Status}}"),
			"Alert {{ Labels.alertname }} on {{Labels.instance}} is {{Status}}"
		);
		assert_eq!(
			normalize("{% if .Status == \"firing\" %}FIRE{% endif %}"),
			"{% if Status == \"firing\" %}FIRE{% endif %}"
		);
		assert_eq!(normalize("{{- .Status -}}"), "{{- Status -}}");
		assert_eq!(
			normalize("{% for a in .Alerts %}{{ a.Labels.job }}{% endfor %}"),
			"{% for a in Alerts %}{{ a.Labels.job }}{% endfor %}"
		);
	}

	#[test]
	fn leaves_bare_templates_alone() {
		let source = "Alert {{ Labels.alertname }} is {{ Status | upper }}";
		assert!(matches!(normalize(source), Cow::Owned(_)));
		assert_eq!(normalize(source), source);
		assert!(matches!(normalize("no dots here {{ Status }}"), Cow::Borrowed(_)));
	}

	#[test]
	fn keeps_dots_outside_references() {
		assert_eq!(normalize("v1.2 {{ 1.5 }}"), "v1.2 {{ 1.5 }}");
		assert_eq!(normalize("{{ \" .Status\" ~ .Status }}"), "{{ \" .Status\" ~ Status }}");
		assert_eq!(normalize("{{ items[0].name }}"), "{{ items[0].name }}");
		assert_eq!(normalize("{{ f(x).y }}"), "{{ f(x).y }}");
		assert_eq!(normalize("{# .Status #} text."), "{# .Status #} text.");
	}

	#[test]
	fn keeps_raw_blocks_verbatim() {
		assert_eq!(
			normalize("{% raw %}{{ .Status }}{% endraw %}{{ .Status }}"),
			"{% raw %}{{ .Status }}{% endraw %}{{ Status }}"
		);
	}

	#[test]
	fn raw_blocks_may_contain_unpaired_quotes() {
		assert_eq!(
			normalize("{% raw %}{{ it's }}{% endraw %}{{ .Status }}"),
			"{% raw %}{{ it's }}{% endraw %}{{ Status }}"
		);
	}

	#[test]
	fn ignores_closing_delimiters_in_strings() {
		assert_eq!(normalize("{{ \"}}\" ~ .Status }}"), "{{ \"}}\" ~ Status }}");
	}

	#[test]
	fn passes_unterminated_tags_through() {
		assert_eq!(normalize("Alert {{ .Labels.alertname"), "Alert {{ .Labels.alertname");
	}
}
