//! The upload form, optionally carrying an inline error message.

use crate::util::{escape_markup, fill_template};

const INDEX_HTML: &str = include_str!("../../static/index.html");

pub fn render_index(message: Option<&str>) -> String {
  let section = match message {
    Some(msg) => format!(
      "<div class=\"message\">\n        <div class=\"error\">⚠️ {}</div>\n      </div>",
      escape_markup(msg)
    ),
    None => String::new(),
  };
  fill_template(INDEX_HTML, &[("message_section", &section)])
}
