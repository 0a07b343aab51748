use scraper::Html;

use crate::app::Result;
use crate::domain::Course;
use crate::parser::config::CourseSelectors;
use crate::parser::html::{element_text, extract_item_id, selector};
use crate::parser::CourseListParser;

pub struct PortalCourseParser {
    selectors: CourseSelectors,
}

impl PortalCourseParser {
    pub fn new(selectors: CourseSelectors) -> Self {
        Self { selectors }
    }
}

impl CourseListParser for PortalCourseParser {
    fn parse_courses(&self, html: &str) -> Result<Vec<Course>> {
        let doc = Html::parse_document(html);
        let link_sel = selector(&self.selectors.link)?;
        let mut courses: Vec<Course> = Vec::new();

        for link in doc.select(&link_sel) {
            let id = link
                .value()
                .attr(&self.selectors.id_attribute)
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .or_else(|| {
                    link.value()
                        .attr("href")
                        .and_then(|href| extract_item_id(href, &self.selectors.id_params))
                });
            let Some(id) = id else {
                tracing::debug!("Skipping course link without id");
                continue;
            };
            if courses.iter().any(|c| c.id == id) {
                continue;
            }
            courses.push(Course::new(id, element_text(link)));
        }

        Ok(courses)
    }
}
