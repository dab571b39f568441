use crate::ChurchId;

/// Marker for records that belong to exactly one church.
///
/// Data-access code uses this to apply the row-scoping predicate, and
/// resource loaders use it to feed the ownership check.
pub trait TenantScoped {
    fn church_id(&self) -> ChurchId;
}

impl<T: TenantScoped + ?Sized> TenantScoped for &T {
    fn church_id(&self) -> ChurchId {
        (**self).church_id()
    }
}
