//! Unit tests for the kube-backed store wiring

#[cfg(test)]
mod tests {
    use crate::stores::{
        KubeComponentStore, KubeCoordStore, KubeSecretStore, KubeSpecStore, KubeWorkloadProbe,
    };

    fn assert_debug<T: std::fmt::Debug>() {}

    // The kube client has no Debug impl, so the stores carry manual ones.
    #[test]
    fn kube_stores_implement_debug() {
        assert_debug::<KubeComponentStore>();
        assert_debug::<KubeSecretStore>();
        assert_debug::<KubeSpecStore>();
        assert_debug::<KubeCoordStore>();
        assert_debug::<KubeWorkloadProbe>();
    }
}
