use tracing::trace;

use super::store::{Managed, ObjectStore};
use crate::controller::ReconcileErr;

/// Look an object up by namespace and name.
///
/// A confirmed absence is `Ok(None)`; any other failure is returned so the
/// pass is retried instead of mistaking an unreachable API for "absent".
pub async fn probe<K, S>(
    store: &S,
    ns: &str,
    name: &str,
) -> Result<Option<K>, ReconcileErr>
where
    K: Managed,
    S: ObjectStore,
{
    match store.get::<K>(ns, name).await {
        Ok(Some(obj)) => Ok(Some(obj)),
        Ok(None) | Err(ReconcileErr::NotFound(_)) => {
            trace!(%ns, %name, kind = %K::kind(&()), "probe: absent");
            Ok(None)
        }
        Err(e) => Err(e),
    }
}
