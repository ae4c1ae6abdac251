use chrono::{DateTime, Utc};

use crate::models::ReminderKind;

const BUTTON_STYLE: &str = "display: inline-block; padding: 10px 20px; background: #0070f3; color: white; text-decoration: none; border-radius: 4px;";

fn layout(body: &str) -> String {
    format!(
        r#"<!DOCTYPE html>
<html>
<head><meta charset="utf-8"></head>
<body style="font-family: sans-serif; max-width: 600px; margin: 0 auto; padding: 20px;">
{body}
</body>
</html>"#
    )
}

pub fn render_otp(name: &str, company_name: &str, otp: &str) -> String {
    layout(&format!(
        r#"    <h2>Verify your email</h2>
    <p>Hi {name},</p>
    <p>Use the code below to verify your email address for <strong>{company_name}</strong>:</p>
    <p style="font-size: 28px; letter-spacing: 6px; font-weight: bold;">{otp}</p>
    <p style="color: #666; font-size: 14px;">This code expires in 10 minutes.</p>"#
    ))
}

pub fn render_password_reset(name: &str, reset_url: &str) -> String {
    layout(&format!(
        r#"    <h2>Password Reset Request</h2>
    <p>Hello {name},</p>
    <p>You requested a password reset for your HRMS account.</p>
    <p><a href="{reset_url}" style="{BUTTON_STYLE}">Reset Password</a></p>
    <p style="color: #666; font-size: 14px;">This link expires in 1 hour. If you didn't request this, you can ignore it.</p>"#
    ))
}

pub fn render_password_changed() -> String {
    layout(
        r#"    <h2>Password Reset Successful</h2>
    <p>Your password has been successfully reset.</p>
    <p style="color: #666; font-size: 14px;">If you did not request this change, please contact support immediately.</p>"#,
    )
}

pub fn render_account_created(
    name: &str,
    company_name: &str,
    email: &str,
    company_code: &str,
    temp_password: &str,
    login_url: &str,
) -> String {
    layout(&format!(
        r#"    <h2>Welcome to {company_name}</h2>
    <p>Hello {name},</p>
    <p>An account has been created for you:</p>
    <ul>
        <li>Email: {email}</li>
        <li>Temporary Password: {temp_password}</li>
        <li>Company Code: {company_code}</li>
    </ul>
    <p>Please log in and change your password immediately.</p>
    <p><a href="{login_url}" style="{BUTTON_STYLE}">Log In</a></p>"#
    ))
}

/// Subject and body for a plan expiry milestone.
pub fn render_plan_reminder(
    company_name: &str,
    kind: ReminderKind,
    days_left: i64,
    plan_end_date: DateTime<Utc>,
    renew_url: &str,
) -> (String, String) {
    let end = plan_end_date.format("%d %B %Y");
    let (subject, headline) = match kind {
        ReminderKind::Expiry => (
            format!("Your HRMS plan for {company_name} has expired"),
            format!("Your plan ended on {end}. Access is suspended until the plan is renewed."),
        ),
        ReminderKind::OneDay => (
            format!("Your HRMS plan for {company_name} expires tomorrow"),
            format!("Your plan ends on {end}. Renew today to avoid interruption."),
        ),
        ReminderKind::FiveDay => (
            format!("Your HRMS plan for {company_name} expires in {days_left} days"),
            format!("Your plan ends on {end}."),
        ),
    };

    let body = layout(&format!(
        r#"    <h2>{subject}</h2>
    <p>{headline}</p>
    <p><a href="{renew_url}" style="{BUTTON_STYLE}">Renew Plan</a></p>"#
    ));

    (subject, body)
}
