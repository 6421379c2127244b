use crate::context::Context;
use crate::output::{Output, OutputFormat};
use do_memory_core::types::{AuditEntry, User};
use serde::Serialize;
use std::io::Write;

#[derive(Debug, Serialize)]
pub struct UserList {
    pub users: Vec<User>,
}

impl Output for UserList {
    fn write_human<W: Write>(&self, mut writer: W) -> anyhow::Result<()> {
        for user in &self.users {
            writeln!(
                writer,
                "{} {} admin={} created={}",
                user.id, user.username, user.is_admin, user.created_at
            )?;
        }
        Ok(())
    }
}

pub async fn add(ctx: &Context, username: &str, display_name: &str, is_admin: bool, format: OutputFormat) -> anyhow::Result<()> {
    let api_key = format!("mk_{}", do_memory_core::MemoryId::generate());
    let user = User {
        id: do_memory_core::MemoryId::generate().0,
        username: username.to_string(),
        api_key,
        display_name: display_name.to_string(),
        is_admin,
        created_at: chrono::Utc::now(),
        last_active_at: None,
    };
    ctx.rows.create_user(&user).await?;
    ctx.rows
        .log_audit(&AuditEntry::new("user_created", None, "admin_cli", serde_json::json!({ "username": username })))
        .await?;
    format.print_output(&UserList { users: vec![user] })?;
    Ok(())
}

pub async fn list(ctx: &Context, format: OutputFormat) -> anyhow::Result<()> {
    let users = ctx.rows.list_users().await?;
    format.print_output(&UserList { users })?;
    Ok(())
}

pub async fn delete(ctx: &Context, id: &str, format: OutputFormat) -> anyhow::Result<()> {
    ctx.rows.delete_user(id).await?;
    ctx.rows
        .log_audit(&AuditEntry::new("user_deleted", None, "admin_cli", serde_json::json!({ "user_id": id })))
        .await?;
    format.print_output(&UserList { users: Vec::new() })?;
    Ok(())
}
