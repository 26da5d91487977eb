use serde::Serialize;

use crate::error::RunError;
use crate::models::{MailerSettings, SupervisionResult};

/// A composed alert, ready for whatever transport delivers it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Alert {
    pub from: String,
    pub to: Vec<String>,
    pub subject: String,
    pub content_type: String,
    pub body: String,
}

impl Alert {
    /// RFC-822 style message: headers, blank line, body.
    pub fn to_message(&self) -> String {
        format!(
            "From: {}\nTo: {}\nSubject: {}\nContent-Type: {}\n\n{}",
            self.from,
            self.to.join("; "),
            self.subject,
            self.content_type,
            self.body
        )
    }
}

pub trait Notifier {
    fn send(&self, alert: &Alert) -> Result<(), String>;
}

/// Writes alerts to the log instead of delivering them.
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn send(&self, alert: &Alert) -> Result<(), String> {
        log::warn!("alert to={:?} subject={}", alert.to, alert.subject);
        log::debug!("alert message value={}", alert.to_message());
        Ok(())
    }
}

/// Logs every recorded error and sends one alert per affected service plus one
/// for run-level errors. Delivery problems are appended to `run_errors`.
pub fn report_errors(
    result: &mut SupervisionResult,
    mailer: Option<&MailerSettings>,
    notifier: &dyn Notifier,
) {
    let settings = mailer.cloned().unwrap_or_default();
    let hostname = result.hostname.clone().unwrap_or_default();
    let subject_prefix = if settings.subject_prefix.is_empty() {
        hostname.to_uppercase()
    } else {
        settings.subject_prefix.clone()
    };

    let mut delivery_errors = Vec::new();

    for (name, errors) in &result.per_service_errors {
        for err in errors {
            log::error!("service got errors service={} error={}", err.service(), err);
        }

        let Some(recipients) = result.notify_lists.get(name) else {
            log::debug!(
                "service doesn't have 'mailing_list'. skip sending emails service={}",
                name
            );
            continue;
        };

        let lines: Vec<String> = errors.iter().map(ToString::to_string).collect();
        let subject = format!("{} | '{}' alert - restarted", subject_prefix, name);
        if let Err(err) = deliver(&settings, &hostname, recipients, subject, &lines, notifier) {
            delivery_errors.push(err);
        }
    }

    for err in &result.run_errors {
        log::error!("nanny script got errors error={}", err);
    }

    if !result.run_errors.is_empty() {
        if settings.mailing_list.is_empty() {
            log::debug!("nanny script doesn't have 'mailing_list'. skip sending emails");
        } else {
            let lines: Vec<String> = result.run_errors.iter().map(ToString::to_string).collect();
            let subject = format!("{} | Nanny script got errors", subject_prefix);
            if let Err(err) = deliver(
                &settings,
                &hostname,
                &settings.mailing_list,
                subject,
                &lines,
                notifier,
            ) {
                delivery_errors.push(err);
            }
        }
    }

    result.run_errors.extend(delivery_errors);
}

fn deliver(
    settings: &MailerSettings,
    hostname: &str,
    recipients: &[String],
    subject: String,
    lines: &[String],
    notifier: &dyn Notifier,
) -> Result<(), RunError> {
    let notification_error = |reason: String| RunError::Notification {
        recipients: recipients.to_vec(),
        reason,
    };

    let from = settings.check(hostname).map_err(|reason| {
        log::warn!(
            "mail config inconsistent. skip sending emails to={:?} error={}",
            recipients,
            reason
        );
        notification_error(reason)
    })?;

    let alert = Alert {
        from,
        to: recipients.to_vec(),
        subject,
        content_type: settings.content_type().to_string(),
        body: compose_body(settings.content_type(), hostname, lines),
    };

    log::debug!(
        "send alert server={} authenticated={} to={:?}",
        settings.smtp_server,
        settings.has_credentials(),
        alert.to
    );

    notifier.send(&alert).map_err(|reason| {
        log::error!("got error when try to send alert error={}", reason);
        notification_error(reason)
    })
}

fn compose_body(content_type: &str, hostname: &str, lines: &[String]) -> String {
    let lines: Vec<String> = lines
        .iter()
        .map(|line| format!("Host '{}' got error: {}\n", hostname, line))
        .collect();

    if content_type.contains("text/html") {
        let rows: String = lines.iter().map(|l| format!("\t\t<br>{}\n", l)).collect();
        format!("\n<html>\n\t<head></head>\n\t<body>\n{}\t</body>\n</html>", rows)
    } else {
        lines.join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ServiceError;
    use crate::models::SupervisorConfig;
    use std::cell::RefCell;

    #[derive(Default)]
    struct RecordingNotifier {
        sent: RefCell<Vec<Alert>>,
    }

    impl Notifier for RecordingNotifier {
        fn send(&self, alert: &Alert) -> Result<(), String> {
            self.sent.borrow_mut().push(alert.clone());
            Ok(())
        }
    }

    struct FailingNotifier;

    impl Notifier for FailingNotifier {
        fn send(&self, _alert: &Alert) -> Result<(), String> {
            Err("connection refused".to_string())
        }
    }

    fn settings(content_type: &str) -> MailerSettings {
        let yaml = format!(
            "general:\n  mail_smtp_server: \"smtp.example.com:25\"\n  mailing_list: [\"ops@example.com\"]\n  mail_content_type: '{}'\n",
            content_type
        );
        SupervisorConfig::from_yaml(&yaml).unwrap().mailer.unwrap()
    }

    fn result_with_errors() -> SupervisionResult {
        let mut result = SupervisionResult {
            hostname: Some("app01.prod.example.com".into()),
            ..Default::default()
        };
        result.per_service_errors.insert(
            "worker".into(),
            vec![ServiceError::AlreadyStopped { service: "worker".into() }],
        );
        result
            .notify_lists
            .insert("worker".into(), vec!["dev@example.com".into()]);
        result
    }

    #[test]
    fn test_service_alert() {
        let mut result = result_with_errors();
        let notifier = RecordingNotifier::default();

        report_errors(&mut result, Some(&settings("")), &notifier);

        let sent = notifier.sent.borrow();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].to, vec!["dev@example.com"]);
        assert_eq!(sent[0].from, "app01@example.com");
        assert_eq!(
            sent[0].subject,
            "APP01.PROD.EXAMPLE.COM | 'worker' alert - restarted"
        );
        assert!(sent[0]
            .body
            .starts_with("Host 'app01.prod.example.com' got error: Service 'worker' stop failed"));
        assert!(result.run_errors.is_empty());
    }

    #[test]
    fn test_run_error_alert_in_html() {
        let mut result = SupervisionResult::fatal(RunError::Hostname);
        result.hostname = Some("db01".into());
        let notifier = RecordingNotifier::default();

        report_errors(&mut result, Some(&settings("text/html")), &notifier);

        let sent = notifier.sent.borrow();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].to, vec!["ops@example.com"]);
        assert_eq!(sent[0].subject, "DB01 | Nanny script got errors");
        assert!(sent[0].body.contains("<html>"));
        assert!(sent[0].body.contains("<br>Host 'db01' got error:"));
        assert!(sent[0].to_message().starts_with("From: db01\nTo: ops@example.com\n"));
    }

    #[test]
    fn test_missing_mail_settings_become_run_errors() {
        let mut result = result_with_errors();
        let notifier = RecordingNotifier::default();

        report_errors(&mut result, None, &notifier);

        assert!(notifier.sent.borrow().is_empty());
        assert_eq!(result.run_errors.len(), 1);
        assert!(matches!(result.run_errors[0], RunError::Notification { .. }));
    }

    #[test]
    fn test_failed_delivery_recorded() {
        let mut result = result_with_errors();

        report_errors(&mut result, Some(&settings("")), &FailingNotifier);

        assert_eq!(result.run_errors.len(), 1);
        assert!(result.run_errors[0].to_string().contains("connection refused"));
    }

    #[test]
    fn test_healthy_run_sends_nothing() {
        let mut result = SupervisionResult {
            hostname: Some("h".into()),
            ..Default::default()
        };
        let notifier = RecordingNotifier::default();

        report_errors(&mut result, Some(&settings("")), &notifier);
        assert!(notifier.sent.borrow().is_empty());
        assert!(result.is_healthy());
    }
}
