//! QTI 1.2 package writer in the flavour Canvas imports.
//!
//! A package is a zip holding:
//!   - `imsmanifest.xml` (IMS content packaging manifest)
//!   - `<id>/<id>.xml` (the `questestinterop` assessment)
//!   - `<id>/assessment_meta.xml` (Canvas quiz settings)
//!
//! Identifiers are content hashes and zip entries carry a fixed timestamp, so
//! the same quiz always produces the same bytes apart from the manifest date.

use std::io::{Cursor, Write};

use sha2::{Digest, Sha256};
use zip::{result::ZipError, write::FileOptions, CompressionMethod, DateTime, ZipWriter};

use crate::domain::{Choice, Question, QuestionKind, Quiz};
use crate::util::escape_markup as esc;

pub const MANIFEST_NAME: &str = "imsmanifest.xml";
const RESPONSE_IDENT: &str = "response1";

/// Short stable identifier derived from the given parts.
fn ident(parts: &[&str]) -> String {
  let mut hasher = Sha256::new();
  for p in parts {
    hasher.update(p.as_bytes());
    hasher.update([0u8]);
  }
  let digest = hasher.finalize();
  let hex: String = digest[..16].iter().map(|b| format!("{b:02x}")).collect();
  format!("g{hex}")
}

fn assessment_ident(quiz: &Quiz, title: &str) -> String {
  let mut hasher = Sha256::new();
  hasher.update(title.as_bytes());
  for q in &quiz.questions {
    hasher.update(q.number.to_be_bytes());
    hasher.update(q.text.as_bytes());
    hasher.update(q.kind.canvas_type().as_bytes());
    for c in q.kind.choices() {
      hasher.update([u8::from(c.correct)]);
      hasher.update(c.text.as_bytes());
    }
  }
  let seed: String = hasher.finalize().iter().map(|b| format!("{b:02x}")).collect();
  ident(&["assessment", &seed])
}

/// Question stem as the HTML Canvas renders, before XML escaping.
fn stem_html(text: &str) -> String {
  format!("<p>{}</p>", esc(text).replace('\n', "<br/>"))
}

fn format_points(points: f64) -> String {
  format!("{points}")
}

fn metadata_field(label: &str, entry: &str) -> String {
  format!(
    "            <qtimetadatafield>\n              <fieldlabel>{label}</fieldlabel>\n              <fieldentry>{}</fieldentry>\n            </qtimetadatafield>\n",
    esc(entry)
  )
}

fn score_condition(condition: &str) -> String {
  format!(
    "          <respcondition continue=\"No\">\n            <conditionvar>\n{condition}            </conditionvar>\n            <setvar action=\"Set\" varname=\"SCORE\">100</setvar>\n          </respcondition>\n"
  )
}

fn varequal(value: &str) -> String {
  format!("<varequal respident=\"{RESPONSE_IDENT}\">{}</varequal>", esc(value))
}

pub struct Package<'q> {
  quiz: &'q Quiz,
  title: String,
  assessment_id: String,
}

impl<'q> Package<'q> {
  /// `fallback_title` is used when the quiz has no `Quiz title:` header.
  pub fn new(quiz: &'q Quiz, fallback_title: &str) -> Self {
    let title = quiz.title.clone().unwrap_or_else(|| fallback_title.to_string());
    let assessment_id = assessment_ident(quiz, &title);
    Self { quiz, title, assessment_id }
  }

  pub fn assessment_id(&self) -> &str {
    &self.assessment_id
  }

  fn assessment_path(&self) -> String {
    format!("{0}/{0}.xml", self.assessment_id)
  }

  fn meta_path(&self) -> String {
    format!("{}/assessment_meta.xml", self.assessment_id)
  }

  pub fn manifest_xml(&self, created: &str) -> String {
    let id = &self.assessment_id;
    let manifest_id = ident(&["manifest", id]);
    let meta_id = ident(&["meta", id]);
    format!(
      r#"<?xml version="1.0" encoding="UTF-8"?>
<manifest identifier="{manifest_id}" xmlns="http://www.imsglobal.org/xsd/imsccv1p1/imscp_v1p1" xmlns:lom="http://ltsc.ieee.org/xsd/imsccv1p1/LOM/resource" xmlns:imsmd="http://www.imsglobal.org/xsd/imsmd_v1p2" xmlns:xsi="http://www.w3.org/2001/XMLSchema-instance" xsi:schemaLocation="http://www.imsglobal.org/xsd/imsccv1p1/imscp_v1p1 http://www.imsglobal.org/xsd/imscp_v1p1.xsd http://ltsc.ieee.org/xsd/imsccv1p1/LOM/resource http://www.imsglobal.org/profile/cc/ccv1p1/LOM/ccv1p1_lomresource_v1p0.xsd http://www.imsglobal.org/xsd/imsmd_v1p2 http://www.imsglobal.org/xsd/imsmd_v1p2p2.xsd">
  <metadata>
    <schema>IMS Content</schema>
    <schemaversion>1.1.3</schemaversion>
    <imsmd:lom>
      <imsmd:general>
        <imsmd:title><imsmd:string>{title}</imsmd:string></imsmd:title>
      </imsmd:general>
      <imsmd:lifeCycle>
        <imsmd:contribute>
          <imsmd:date><imsmd:dateTime>{created}</imsmd:dateTime></imsmd:date>
        </imsmd:contribute>
      </imsmd:lifeCycle>
    </imsmd:lom>
  </metadata>
  <organizations/>
  <resources>
    <resource identifier="{id}" type="imsqti_xmlv1p2">
      <file href="{assessment_path}"/>
      <dependency identifierref="{meta_id}"/>
    </resource>
    <resource identifier="{meta_id}" type="associatedcontent/imscc_xmlv1p1/learning-application-resource" href="{meta_path}">
      <file href="{meta_path}"/>
    </resource>
  </resources>
</manifest>
"#,
      title = esc(&self.title),
      created = esc(created),
      assessment_path = self.assessment_path(),
      meta_path = self.meta_path(),
    )
  }

  pub fn meta_xml(&self) -> String {
    format!(
      r#"<?xml version="1.0" encoding="UTF-8"?>
<quiz identifier="{id}" xmlns="http://canvas.instructure.com/xsd/cccv1p0" xmlns:xsi="http://www.w3.org/2001/XMLSchema-instance" xsi:schemaLocation="http://canvas.instructure.com/xsd/cccv1p0 https://canvas.instructure.com/xsd/cccv1p0.xsd">
  <title>{title}</title>
  <description>{description}</description>
  <shuffle_answers>false</shuffle_answers>
  <scoring_policy>keep_highest</scoring_policy>
  <hide_results></hide_results>
  <quiz_type>assignment</quiz_type>
  <points_possible>{points}</points_possible>
  <show_correct_answers>true</show_correct_answers>
  <allowed_attempts>1</allowed_attempts>
  <one_question_at_a_time>false</one_question_at_a_time>
  <cant_go_back>false</cant_go_back>
  <available>false</available>
</quiz>
"#,
      id = self.assessment_id,
      title = esc(&self.title),
      description = esc(&self.quiz.description.as_deref().map(stem_html).unwrap_or_default()),
      points = format_points(self.quiz.points_possible()),
    )
  }

  pub fn assessment_xml(&self) -> String {
    let items: String = self
      .quiz
      .questions
      .iter()
      .enumerate()
      .map(|(idx, q)| self.item_xml(idx, q))
      .collect();
    format!(
      r#"<?xml version="1.0" encoding="UTF-8"?>
<questestinterop xmlns="http://www.imsglobal.org/xsd/ims_qtiasiv1p2" xmlns:xsi="http://www.w3.org/2001/XMLSchema-instance" xsi:schemaLocation="http://www.imsglobal.org/xsd/ims_qtiasiv1p2 http://www.imsglobal.org/xsd/ims_qtiasiv1p2p1.xsd">
  <assessment ident="{id}" title="{title}">
    <qtimetadata>
      <qtimetadatafield>
        <fieldlabel>cc_maxattempts</fieldlabel>
        <fieldentry>1</fieldentry>
      </qtimetadatafield>
    </qtimetadata>
    <section ident="root_section">
{items}    </section>
  </assessment>
</questestinterop>
"#,
      id = self.assessment_id,
      title = esc(&self.title),
    )
  }

  fn item_xml(&self, idx: usize, q: &Question) -> String {
    let item_id = ident(&[&self.assessment_id, "item", &idx.to_string()]);
    let choice_ids: Vec<String> = (0..q.kind.choices().len())
      .map(|i| ident(&[&item_id, "choice", &i.to_string()]))
      .collect();

    let mut meta = String::new();
    meta.push_str(&metadata_field("question_type", q.kind.canvas_type()));
    meta.push_str(&metadata_field("points_possible", &format_points(q.points)));
    meta.push_str(&metadata_field("original_answer_ids", &choice_ids.join(",")));
    meta.push_str(&metadata_field(
      "assessment_question_identifierref",
      &ident(&[&item_id, "question"]),
    ));

    let (response, conditions) = match &q.kind {
      QuestionKind::MultipleChoice { choices } | QuestionKind::TrueFalse { choices } => {
        let correct = choices
          .iter()
          .zip(&choice_ids)
          .find(|(c, _)| c.correct)
          .map(|(_, id)| id.as_str())
          .unwrap_or_default();
        let cond = format!("              {}\n", varequal(correct));
        (render_choice(choices, &choice_ids, "Single"), score_condition(&cond))
      }
      QuestionKind::MultipleAnswers { choices } => {
        let mut cond = String::from("              <and>\n");
        for (c, id) in choices.iter().zip(&choice_ids) {
          if c.correct {
            cond.push_str(&format!("                {}\n", varequal(id)));
          } else {
            cond.push_str(&format!("                <not>{}</not>\n", varequal(id)));
          }
        }
        cond.push_str("              </and>\n");
        (render_choice(choices, &choice_ids, "Multiple"), score_condition(&cond))
      }
      QuestionKind::ShortAnswer { answers } => {
        let cond: String = answers.iter().map(|a| format!("              {}\n", varequal(a))).collect();
        (render_fib(), score_condition(&cond))
      }
      QuestionKind::Essay => (
        render_fib(),
        "          <respcondition continue=\"No\">\n            <conditionvar>\n              <other/>\n            </conditionvar>\n          </respcondition>\n".to_string(),
      ),
    };

    format!(
      r#"      <item ident="{item_id}" title="Question {number}">
        <itemmetadata>
          <qtimetadata>
{meta}          </qtimetadata>
        </itemmetadata>
        <presentation>
          <material>
            <mattext texttype="text/html">{stem}</mattext>
          </material>
{response}        </presentation>
        <resprocessing>
          <outcomes>
            <decvar maxvalue="100" minvalue="0" varname="SCORE" vartype="Decimal"/>
          </outcomes>
{conditions}        </resprocessing>
      </item>
"#,
      number = q.number,
      stem = esc(&stem_html(&q.text)),
    )
  }

  /// Assemble the zip. `created` goes into the manifest metadata only.
  pub fn to_zip(&self, created: &str) -> Result<Vec<u8>, ZipError> {
    let entries = [
      (MANIFEST_NAME.to_string(), self.manifest_xml(created)),
      (self.assessment_path(), self.assessment_xml()),
      (self.meta_path(), self.meta_xml()),
    ];

    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
    for (name, body) in entries {
      let options = FileOptions::<()>::default()
        .compression_method(CompressionMethod::Deflated)
        .last_modified_time(DateTime::default())
        .unix_permissions(0o644);
      zip.start_file(name, options)?;
      zip.write_all(body.as_bytes())?;
    }
    Ok(zip.finish()?.into_inner())
  }
}

fn render_choice(choices: &[Choice], ids: &[String], cardinality: &str) -> String {
  let mut out = format!(
    "          <response_lid ident=\"{RESPONSE_IDENT}\" rcardinality=\"{cardinality}\">\n            <render_choice>\n"
  );
  for (c, id) in choices.iter().zip(ids) {
    out.push_str(&format!(
      "              <response_label ident=\"{id}\"><material><mattext texttype=\"text/plain\">{}</mattext></material></response_label>\n",
      esc(&c.text)
    ));
  }
  out.push_str("            </render_choice>\n          </response_lid>\n");
  out
}

fn render_fib() -> String {
  format!(
    "          <response_str ident=\"{RESPONSE_IDENT}\" rcardinality=\"Single\">\n            <render_fib>\n              <response_label ident=\"answer1\" rshuffle=\"No\"/>\n            </render_fib>\n          </response_str>\n"
  )
}
