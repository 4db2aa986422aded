use crate::models::{service_display_name, Application};

const DATE_FORMAT: &str = "%d.%m.%Y %H:%M";
const SEPARATOR: &str = "━━━━━━━━━━━━━━";

/// Escape the characters that carry meaning in the chat provider's HTML markup.
pub fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            _ => escaped.push(ch),
        }
    }
    escaped
}

struct Lines<'a> {
    email: &'a str,
    service: &'a str,
    message: &'a str,
    created_at: String,
}

fn lines(application: &Application) -> Lines<'_> {
    Lines {
        email: application.email.as_deref().unwrap_or("Не указан"),
        service: application
            .service_type
            .as_deref()
            .map(service_display_name)
            .unwrap_or("Не указана"),
        message: application.message.as_deref().unwrap_or("Не указано"),
        created_at: application.created_at.format(DATE_FORMAT).to_string(),
    }
}

pub fn subject(application: &Application) -> String {
    format!("Новая заявка #{}", application.id)
}

/// Chat message in HTML parse mode.
pub fn chat_message(application: &Application) -> String {
    let l = lines(application);
    format!(
        "<b>📌 Новая заявка #{id}</b>\n\
         {SEPARATOR}\n\
         <b>📝 Имя:</b> {name}\n\
         <b>📞 Телефон:</b> {phone}\n\
         <b>📧 Email:</b> {email}\n\
         <b>🛠 Услуга:</b> {service}\n\
         <b>📋 Сообщение:</b> {message}\n\
         {SEPARATOR}\n\
         <b>🌐 IP:</b> {ip}\n\
         <b>📅 Дата:</b> {date}",
        id = application.id,
        name = escape_html(&application.name),
        phone = escape_html(&application.phone),
        email = escape_html(l.email),
        service = escape_html(l.service),
        message = escape_html(l.message),
        ip = escape_html(&application.ip_address),
        date = l.created_at,
    )
}

pub fn plain_text(application: &Application) -> String {
    let l = lines(application);
    format!(
        "Новая заявка #{id}\n\n\
         Имя: {name}\n\
         Телефон: {phone}\n\
         Email: {email}\n\
         Услуга: {service}\n\
         Сообщение: {message}\n\n\
         IP: {ip}\n\
         Дата: {date}\n",
        id = application.id,
        name = application.name,
        phone = application.phone,
        email = l.email,
        service = l.service,
        message = l.message,
        ip = application.ip_address,
        date = l.created_at,
    )
}

pub fn html(application: &Application) -> String {
    let l = lines(application);
    let rows = [
        ("Имя", escape_html(&application.name)),
        ("Телефон", escape_html(&application.phone)),
        ("Email", escape_html(l.email)),
        ("Услуга", escape_html(l.service)),
        ("Сообщение", escape_html(l.message)),
        ("IP", escape_html(&application.ip_address)),
        ("Дата", l.created_at.clone()),
    ];

    let mut body = format!(
        "<html><body><h2>Новая заявка #{}</h2><table>",
        application.id
    );
    for (label, value) in rows {
        body.push_str(&format!("<tr><th align=\"left\">{label}</th><td>{value}</td></tr>"));
    }
    body.push_str("</table></body></html>");
    body
}
