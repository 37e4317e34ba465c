use crate::event::AlarmEvent;

const SOFTWARE_TAG: &str = concat!("telemail ", env!("CARGO_PKG_VERSION"));

pub struct MessageContent {
    pub text: String,
    pub html: String,
}

/// Build the plain-text and HTML bodies for one alarm notification. Mail
/// clients render the last alternative part they support, so HTML wins where
/// available.
pub fn compose_message(event: &AlarmEvent, archiver_urls: &[String]) -> MessageContent {
    MessageContent {
        text: compose_text(event, archiver_urls),
        html: compose_html(event, archiver_urls),
    }
}

fn archiver_link(base: &str, event: &AlarmEvent) -> String {
    format!(
        "{}/?pv={}&to={}",
        base.trim_end_matches('/'),
        event.point,
        event.timestamp.utc_str()
    )
}

fn compose_text(event: &AlarmEvent, archiver_urls: &[String]) -> String {
    let mut body = format!(
        "{}\n\n\
         - Point name:      {}\n\
         - Specified range: {}\n\
         - Value measured:  {} {}\n\
         - Timestamp:       {}\n",
        event.warning,
        event.point,
        event.specified_range,
        event.value_measured,
        event.unit,
        event.timestamp.local_str(),
    );

    if !archiver_urls.is_empty() {
        body.push_str("\nArchiver links:\n");
        for url in archiver_urls {
            body.push_str(&format!("   {}\n", archiver_link(url, event)));
        }
    }

    body.push_str(&format!("\n{}\n", SOFTWARE_TAG));
    body
}

fn compose_html(event: &AlarmEvent, archiver_urls: &[String]) -> String {
    let mut links = String::new();
    if !archiver_urls.is_empty() {
        links.push_str("<h4>Archiver links:</h4>\n<ul>\n");
        for url in archiver_urls {
            let link = archiver_link(url, event);
            links.push_str(&format!("  <li><a href=\"{0}\">{0}</a></li>\n", link));
        }
        links.push_str("</ul>\n");
    }

    format!(
        "<html>\n\
         <body>\n\
         <h2>{}</h2>\n\
         <ul>\n\
           <li><b>Point name:      </b> {}</li>\n\
           <li><b>Specified range: </b> {}</li>\n\
           <li><b>Value measured:  </b> {} {}</li>\n\
           <li><b>Timestamp:       </b> {}</li>\n\
         </ul>\n\
         {}\
         <i>{}</i>\n\
         </body>\n\
         </html>",
        event.warning,
        event.point,
        event.specified_range,
        event.value_measured,
        event.unit,
        event.timestamp.local_str(),
        links,
        SOFTWARE_TAG,
    )
}

#[cfg(test)]
mod tests {
    use crate::condition::ConditionKind;
    use crate::event::{AlarmEvent, Timestamp};

    use super::compose_message;

    fn event_fixture() -> AlarmEvent {
        AlarmEvent {
            point: "TEST:PV".to_string(),
            condition: ConditionKind::InferiorThan,
            specified_range: "value required to be higher than 0".to_string(),
            unit: "mbar".to_string(),
            subject: "vacuum warning".to_string(),
            recipients: vec!["ops@example.org".to_string()],
            warning: "pressure dropped".to_string(),
            value_measured: "-100".to_string(),
            timestamp: Timestamp::now(),
        }
    }

    #[test]
    fn both_parts_carry_the_event_fields() {
        let event = event_fixture();
        let content = compose_message(&event, &[]);

        for body in [&content.text, &content.html] {
            assert!(body.contains("pressure dropped"));
            assert!(body.contains("TEST:PV"));
            assert!(body.contains("value required to be higher than 0"));
            assert!(body.contains("-100 mbar"));
            assert!(body.contains(event.timestamp.local_str()));
        }
        assert!(!content.text.contains("Archiver links"));
        assert!(content.html.starts_with("<html>"));
    }

    #[test]
    fn archiver_links_point_at_the_event_instant() {
        let event = event_fixture();
        let urls = vec!["https://archiver.example.org/viewer".to_string()];
        let content = compose_message(&event, &urls);

        let expected = format!(
            "https://archiver.example.org/viewer/?pv=TEST:PV&to={}",
            event.timestamp.utc_str()
        );
        assert!(content.text.contains(&expected));
        assert!(content.html.contains(&expected));
    }
}
