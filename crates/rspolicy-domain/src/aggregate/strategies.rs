//! Command handling: validation, event production and responses.
//!
//! Every command yields exactly one [`CommandResult`]. Mutations are checked
//! against the state they would produce: serialized size first, then
//! already-expired subjects, then structural validation. Nothing is
//! persisted here; the caller appends the event and folds it in.

use chrono::{DateTime, Utc};

use crate::error::{DomainError, DomainResult};
use crate::model::{Lifecycle, Policy, PolicyId};
use crate::validation;

use super::commands::{CommandContext, PolicyCommand};
use super::etag::ETag;
use super::events::{PolicyEvent, PolicyEventPayload};
use super::result::{CommandResult, Mutation, PolicyResponse};

/// Handles `command` against `current` (the state at revision `next_revision - 1`).
pub(crate) fn handle(
    current: Option<&Policy>,
    next_revision: u64,
    ctx: &CommandContext,
    command: PolicyCommand,
) -> CommandResult {
    let handling = Handling {
        current,
        next_revision,
        ctx,
    };
    let outcome = if command.is_query() {
        handling.query(&command)
    } else {
        handling.modify(command)
    };
    outcome.unwrap_or_else(CommandResult::Error)
}

struct Handling<'a> {
    current: Option<&'a Policy>,
    next_revision: u64,
    ctx: &'a CommandContext,
}

impl<'a> Handling<'a> {
    fn active(&self, policy_id: &PolicyId) -> DomainResult<&'a Policy> {
        self.current
            .filter(|policy| !policy.is_deleted())
            .ok_or_else(|| DomainError::PolicyNotAccessible {
                policy_id: policy_id.to_string(),
            })
    }

    fn modify(&self, command: PolicyCommand) -> DomainResult<CommandResult> {
        match command {
            PolicyCommand::CreatePolicy { policy } => {
                if self.current.is_some_and(|p| !p.is_deleted()) {
                    return Err(DomainError::PolicyConflict {
                        policy_id: policy.id().to_string(),
                    });
                }
                let now = self.ctx.now;
                let adjusted = policy
                    .to_builder()
                    .set_lifecycle(Lifecycle::Active)
                    .set_revision(self.next_revision)
                    .set_created(Some(now))
                    .set_modified(Some(now))
                    .build();
                let payload = PolicyEventPayload::PolicyCreated {
                    policy: adjusted.clone(),
                };
                self.mutate(
                    PolicyCommand::CreatePolicy { policy: adjusted },
                    payload,
                    true,
                    |next| PolicyResponse::CreatePolicy {
                        policy: next.clone(),
                    },
                )
            }
            PolicyCommand::ModifyPolicy { policy } => {
                self.active(policy.id())?;
                let payload = PolicyEventPayload::PolicyModified {
                    policy: policy.clone(),
                };
                self.mutate(PolicyCommand::ModifyPolicy { policy }, payload, true, |next| {
                    PolicyResponse::ModifyPolicy {
                        policy_id: next.id().clone(),
                    }
                })
            }
            PolicyCommand::DeletePolicy { policy_id } => {
                self.active(&policy_id)?;
                let response = PolicyResponse::DeletePolicy {
                    policy_id: policy_id.clone(),
                };
                self.mutate(
                    PolicyCommand::DeletePolicy { policy_id },
                    PolicyEventPayload::PolicyDeleted,
                    false,
                    |_| response,
                )
            }
            PolicyCommand::ModifyPolicyEntry { policy_id, entry } => {
                let current = self.active(&policy_id)?;
                let created = current.entry(&entry.label).is_none();
                let payload = if created {
                    PolicyEventPayload::PolicyEntryCreated {
                        entry: entry.clone(),
                    }
                } else {
                    PolicyEventPayload::PolicyEntryModified {
                        entry: entry.clone(),
                    }
                };
                let response = PolicyResponse::ModifyPolicyEntry {
                    policy_id: policy_id.clone(),
                    entry: entry.clone(),
                    created,
                };
                self.mutate(
                    PolicyCommand::ModifyPolicyEntry { policy_id, entry },
                    payload,
                    true,
                    |_| response,
                )
            }
            PolicyCommand::ModifyPolicyEntries { policy_id, entries } => {
                self.active(&policy_id)?;
                let payload = PolicyEventPayload::PolicyEntriesModified {
                    entries: entries.clone(),
                };
                let response = PolicyResponse::ModifyPolicyEntries {
                    policy_id: policy_id.clone(),
                };
                self.mutate(
                    PolicyCommand::ModifyPolicyEntries { policy_id, entries },
                    payload,
                    true,
                    |_| response,
                )
            }
            PolicyCommand::DeletePolicyEntry { policy_id, label } => {
                let current = self.active(&policy_id)?;
                if current.entry(&label).is_none() {
                    return Err(DomainError::PolicyEntryNotFound {
                        policy_id: policy_id.to_string(),
                        label: label.to_string(),
                    });
                }
                if current.entry_count() == 1 {
                    return Err(DomainError::PolicyEntryNotDeletable {
                        policy_id: policy_id.to_string(),
                        label: label.to_string(),
                    });
                }
                let payload = PolicyEventPayload::PolicyEntryDeleted {
                    label: label.clone(),
                };
                let response = PolicyResponse::DeletePolicyEntry {
                    policy_id: policy_id.clone(),
                    label: label.clone(),
                };
                self.mutate(
                    PolicyCommand::DeletePolicyEntry { policy_id, label },
                    payload,
                    false,
                    |_| response,
                )
            }
            PolicyCommand::ModifyPolicyImport { policy_id, import } => {
                let current = self.active(&policy_id)?;
                let created = !current
                    .imports()
                    .is_some_and(|imports| imports.contains(&import.imported_policy_id));
                let payload = if created {
                    PolicyEventPayload::PolicyImportCreated {
                        import: import.clone(),
                    }
                } else {
                    PolicyEventPayload::PolicyImportModified {
                        import: import.clone(),
                    }
                };
                let response = PolicyResponse::ModifyPolicyImport {
                    policy_id: policy_id.clone(),
                    import: import.clone(),
                    created,
                };
                self.mutate(
                    PolicyCommand::ModifyPolicyImport { policy_id, import },
                    payload,
                    true,
                    |_| response,
                )
            }
            PolicyCommand::ModifyPolicyImports { policy_id, imports } => {
                self.active(&policy_id)?;
                let payload = PolicyEventPayload::PolicyImportsModified {
                    imports: imports.clone(),
                };
                let response = PolicyResponse::ModifyPolicyImports {
                    policy_id: policy_id.clone(),
                };
                self.mutate(
                    PolicyCommand::ModifyPolicyImports { policy_id, imports },
                    payload,
                    true,
                    |_| response,
                )
            }
            PolicyCommand::DeletePolicyImport {
                policy_id,
                imported_policy_id,
            } => {
                let current = self.active(&policy_id)?;
                if !current
                    .imports()
                    .is_some_and(|imports| imports.contains(&imported_policy_id))
                {
                    return Err(DomainError::PolicyImportNotFound {
                        policy_id: policy_id.to_string(),
                        imported_policy_id: imported_policy_id.to_string(),
                    });
                }
                let payload = PolicyEventPayload::PolicyImportDeleted {
                    imported_policy_id: imported_policy_id.clone(),
                };
                let response = PolicyResponse::DeletePolicyImport {
                    policy_id: policy_id.clone(),
                    imported_policy_id: imported_policy_id.clone(),
                };
                self.mutate(
                    PolicyCommand::DeletePolicyImport {
                        policy_id,
                        imported_policy_id,
                    },
                    payload,
                    false,
                    |_| response,
                )
            }
            query => self.query(&query),
        }
    }

    /// Builds the event, folds it into a preview of the next state and
    /// checks that state before accepting the command.
    fn mutate(
        &self,
        command: PolicyCommand,
        payload: PolicyEventPayload,
        check_next: bool,
        respond: impl FnOnce(&Policy) -> PolicyResponse,
    ) -> DomainResult<CommandResult> {
        let event = PolicyEvent::new(
            command.policy_id().clone(),
            self.next_revision,
            self.ctx.now,
            payload,
        );
        let next = event.apply_to(self.current)?;
        if check_next {
            self.check(&next)?;
        }

        let previous_etag = self
            .current
            .filter(|policy| !policy.is_deleted())
            .and_then(|policy| addressed_etag(&command, policy));
        let next_etag = if next.is_deleted() {
            None
        } else {
            addressed_etag(&command, &next)
        };

        Ok(CommandResult::Mutation(Box::new(Mutation {
            becomes_created: event.is_created(),
            becomes_deleted: event.is_deleted(),
            response: respond(&next),
            command,
            event,
            previous_etag,
            next_etag,
        })))
    }

    fn check(&self, next: &Policy) -> DomainResult<()> {
        self.ctx.size_limit.check(next, next)?;
        check_expired_subjects(next, self.ctx.now)?;
        validation::validate(next)
    }

    fn query(&self, command: &PolicyCommand) -> DomainResult<CommandResult> {
        let policy = self.active(command.policy_id())?;
        let policy_id = policy.id().clone();

        let response = match command {
            PolicyCommand::RetrievePolicyEntry { label, .. } => {
                let entry = policy
                    .entry(label)
                    .ok_or_else(|| DomainError::PolicyEntryNotFound {
                        policy_id: policy_id.to_string(),
                        label: label.to_string(),
                    })?;
                PolicyResponse::RetrievePolicyEntry {
                    policy_id,
                    entry: entry.clone(),
                }
            }
            PolicyCommand::RetrievePolicyEntries { .. } => PolicyResponse::RetrievePolicyEntries {
                policy_id,
                entries: policy.entries().cloned().collect(),
            },
            PolicyCommand::RetrievePolicyImport {
                imported_policy_id, ..
            } => {
                let import = policy
                    .imports()
                    .and_then(|imports| imports.get(imported_policy_id))
                    .ok_or_else(|| DomainError::PolicyImportNotFound {
                        policy_id: policy_id.to_string(),
                        imported_policy_id: imported_policy_id.to_string(),
                    })?;
                PolicyResponse::RetrievePolicyImport {
                    policy_id,
                    import: import.clone(),
                }
            }
            PolicyCommand::RetrievePolicyImports { .. } => {
                let imports = policy
                    .imports()
                    .ok_or_else(|| DomainError::PolicyImportsNotFound {
                        policy_id: policy_id.to_string(),
                    })?;
                PolicyResponse::RetrievePolicyImports {
                    policy_id,
                    imports: imports.clone(),
                }
            }
            PolicyCommand::SudoRetrievePolicy { .. } => PolicyResponse::SudoRetrievePolicy {
                policy: policy.clone(),
            },
            _ => PolicyResponse::RetrievePolicy {
                policy: policy.clone(),
            },
        };

        Ok(CommandResult::Query {
            response,
            etag: addressed_etag(command, policy),
        })
    }
}

/// Rejects a state containing a subject whose expiry has already passed.
fn check_expired_subjects(policy: &Policy, now: DateTime<Utc>) -> DomainResult<()> {
    for entry in policy.entries() {
        if let Some(subject) = entry.first_expired_subject(now) {
            return Err(DomainError::SubjectAlreadyExpired {
                policy_id: policy.id().to_string(),
                label: entry.label.to_string(),
                subject_id: subject.id.to_string(),
            });
        }
    }
    Ok(())
}

/// Tag of the sub-resource `command` addresses within `policy`.
fn addressed_etag(command: &PolicyCommand, policy: &Policy) -> Option<ETag> {
    match command {
        PolicyCommand::CreatePolicy { .. }
        | PolicyCommand::ModifyPolicy { .. }
        | PolicyCommand::DeletePolicy { .. }
        | PolicyCommand::RetrievePolicy { .. }
        | PolicyCommand::SudoRetrievePolicy { .. } => Some(ETag::of_revision(policy.revision())),
        PolicyCommand::ModifyPolicyEntry { entry, .. } => {
            policy.entry(&entry.label).and_then(ETag::of_value)
        }
        PolicyCommand::DeletePolicyEntry { label, .. }
        | PolicyCommand::RetrievePolicyEntry { label, .. } => {
            policy.entry(label).and_then(ETag::of_value)
        }
        PolicyCommand::ModifyPolicyEntries { .. } | PolicyCommand::RetrievePolicyEntries { .. } => {
            ETag::of_value(&policy.entries().collect::<Vec<_>>())
        }
        PolicyCommand::ModifyPolicyImport { import, .. } => policy
            .imports()
            .and_then(|imports| imports.get(&import.imported_policy_id))
            .and_then(ETag::of_value),
        PolicyCommand::DeletePolicyImport {
            imported_policy_id, ..
        }
        | PolicyCommand::RetrievePolicyImport {
            imported_policy_id, ..
        } => policy
            .imports()
            .and_then(|imports| imports.get(imported_policy_id))
            .and_then(ETag::of_value),
        PolicyCommand::ModifyPolicyImports { .. } | PolicyCommand::RetrievePolicyImports { .. } => {
            policy.imports().and_then(ETag::of_value)
        }
    }
}
