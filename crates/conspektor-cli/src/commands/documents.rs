//! Document management command handlers

use anyhow::{bail, Context, Result};

use conspektor_core::GatewayClient;

use crate::output::Output;
use crate::prompt::confirm;

/// List all documents
pub async fn list(gateway: &GatewayClient, output: &Output) -> Result<()> {
    let docs = gateway
        .list_documents()
        .await
        .context("Failed to list documents")?;

    output.print_documents(&docs);
    Ok(())
}

/// Create a new document
pub async fn create(
    gateway: &GatewayClient,
    title: String,
    owner: Option<&str>,
    output: &Output,
) -> Result<()> {
    let title = title.trim();
    if title.is_empty() {
        bail!("Title cannot be empty");
    }

    let doc = gateway
        .create_document(title, owner)
        .await
        .context("Failed to create document")?;

    output.success(&format!("Created document: {}", doc.id));
    output.print_document(&doc);

    Ok(())
}

/// Delete a document
pub async fn delete(gateway: &GatewayClient, id: String, output: &Output) -> Result<()> {
    if output.should_prompt() {
        let title = match gateway.fetch_document(&id).await {
            Ok(snapshot) => snapshot.title,
            Err(e) if e.is_not_found() => bail!("Document not found: {}", id),
            Err(e) => return Err(e).context("Failed to fetch document"),
        };

        println!("Delete document: {} - {}", id, title);
        if !confirm("Are you sure?")? {
            println!("Cancelled.");
            return Ok(());
        }
    }

    gateway
        .delete_document(&id)
        .await
        .context("Failed to delete document")?;

    output.success(&format!("Deleted document: {}", id));

    Ok(())
}

/// Give another user access to a document
pub async fn share(
    gateway: &GatewayClient,
    id: String,
    username: String,
    output: &Output,
) -> Result<()> {
    let user = match gateway.find_user(&username).await {
        Ok(user) => user,
        Err(e) if e.is_not_found() => bail!("No user named '{}'", username),
        Err(e) => return Err(e).context("Failed to look up user"),
    };

    gateway
        .add_collaborator(&id, &user.username)
        .await
        .context("Failed to share document")?;

    output.success(&format!("Shared document {} with {}", id, user.username));

    Ok(())
}
