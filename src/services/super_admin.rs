//! Super-admin management and the cross-challenge observer view.

use std::sync::Arc;

use chrono::Utc;
use tracing::{info, instrument};

use crate::domain::{Challenge, SuperAdmin, UserId};
use crate::error::{DatabaseError, ServiceError, ServiceResult};
use crate::storage::Database;

#[derive(Clone)]
pub struct SuperAdminService {
  db: Arc<Database>,
}

impl SuperAdminService {
  pub fn new(db: Arc<Database>) -> Self { Self { db } }

  pub fn is_super_admin(&self, user: UserId) -> ServiceResult<bool> {
    Ok(self.db.is_super_admin(user)?)
  }

  fn ensure(&self, user: UserId) -> ServiceResult<()> {
    if self.db.is_super_admin(user)? { Ok(()) } else { Err(ServiceError::NotSuperAdmin) }
  }

  #[instrument(level = "info", skip(self))]
  pub fn grant(&self, by: UserId, target: UserId) -> ServiceResult<()> {
    self.ensure(by)?;
    if self.db.is_super_admin(target)? {
      return Err(ServiceError::AlreadySuperAdmin);
    }
    match self.db.insert_super_admin(target, Utc::now()) {
      Ok(()) => {
        info!(target: "challenge", by, target, "Super admin granted");
        Ok(())
      }
      Err(DatabaseError::ConstraintViolation(_)) => Err(ServiceError::AlreadySuperAdmin),
      Err(e) => Err(e.into()),
    }
  }

  #[instrument(level = "info", skip(self))]
  pub fn revoke(&self, by: UserId, target: UserId) -> ServiceResult<()> {
    self.ensure(by)?;
    if by == target {
      return Err(ServiceError::CannotRemoveSelf);
    }
    if !self.db.delete_super_admin(target)? {
      return Err(ServiceError::SuperAdminNotFound);
    }
    info!(target: "challenge", by, target, "Super admin revoked");
    Ok(())
  }

  /// Startup bootstrap; a no-op when the user already is one.
  pub fn seed(&self, user: UserId) -> ServiceResult<bool> {
    let added = self.db.insert_super_admin_if_absent(user, Utc::now())?;
    if added {
      info!(target: "challenge", user, "Super admin seeded from configuration");
    }
    Ok(added)
  }

  pub fn list(&self, by: UserId) -> ServiceResult<Vec<SuperAdmin>> {
    self.ensure(by)?;
    Ok(self.db.list_super_admins()?)
  }

  /// Every challenge, newest activity first.
  pub fn all_challenges(&self, by: UserId) -> ServiceResult<Vec<Challenge>> {
    self.ensure(by)?;
    Ok(self.db.all_challenges()?)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn svc() -> SuperAdminService {
    SuperAdminService::new(Arc::new(Database::open_in_memory().unwrap()))
  }

  #[test]
  fn grant_and_revoke_rules() {
    let s = svc();
    assert!(matches!(s.grant(1, 2), Err(ServiceError::NotSuperAdmin)));

    assert!(s.seed(1).unwrap());
    assert!(!s.seed(1).unwrap());

    s.grant(1, 2).unwrap();
    assert!(matches!(s.grant(1, 2), Err(ServiceError::AlreadySuperAdmin)));
    assert!(matches!(s.revoke(1, 1), Err(ServiceError::CannotRemoveSelf)));
    assert!(matches!(s.revoke(1, 3), Err(ServiceError::SuperAdminNotFound)));

    s.revoke(2, 1).unwrap();
    assert!(!s.is_super_admin(1).unwrap());
    assert_eq!(s.list(2).unwrap().len(), 1);
    assert!(matches!(s.all_challenges(1), Err(ServiceError::NotSuperAdmin)));
  }
}
