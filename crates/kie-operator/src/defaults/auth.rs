//! Authentication settings: SSO, LDAP and role mapping.

use std::path::Path;

use k8s_openapi::api::core::v1::EnvVar;
use snafu::ensure;

use super::{
    MissingLdapUrlSnafu, MissingSsoSettingsSnafu, MultipleAuthTypesSnafu, Result,
    RoleMapperWithoutAuthSnafu, SsoClientCountSnafu,
    servers::{get_server_set, object_template},
};
use crate::{
    constants::{ROLE_MAPPER_DEFAULT_DIR, SSO_DEFAULT_PRINCIPAL_ATTRIBUTE},
    context::{AuthTemplate, EnvTemplate, RoleMapperTemplate},
    crd::{KieAppSpec, RoleMapperAuthConfig},
    objects::CustomObject,
};

const SSO_CLIENT_ENV: &str = "SSO_CLIENT";
const HOSTNAME_HTTPS_ENV: &str = "HOSTNAME_HTTPS";

/// Validates the authentication settings of `spec` and copies them, together with the SSO
/// clients of the console and every server deployment, into `template`.
pub fn configure_auth(spec: &KieAppSpec, application_name: &str, template: &mut EnvTemplate) -> Result<()> {
    let auth = &spec.auth;
    if auth.sso.is_none() && auth.ldap.is_none() && auth.role_mapper.is_none() {
        return Ok(());
    }
    ensure!(
        auth.sso.is_none() || auth.ldap.is_none(),
        MultipleAuthTypesSnafu
    );
    ensure!(
        auth.sso.is_some() || auth.ldap.is_some(),
        RoleMapperWithoutAuthSnafu
    );

    let mut auth_template = AuthTemplate {
        role_mapper: auth.role_mapper.as_ref().map(role_mapper_template),
        ..AuthTemplate::default()
    };

    if let Some(sso) = &auth.sso {
        ensure!(
            !sso.url.is_empty() && !sso.realm.is_empty(),
            MissingSsoSettingsSnafu
        );
        let mut sso = sso.clone();
        if sso.principal_attribute.is_empty() {
            SSO_DEFAULT_PRINCIPAL_ATTRIBUTE.clone_into(&mut sso.principal_attribute);
        }
        auth_template.sso = Some(sso);

        if let Some(client) = &spec.objects.console.sso_client {
            template.console.sso_auth_client = client.clone();
        }
        let expected = template.servers.len();
        let mut given = 0;
        for (index, server) in template.servers.iter_mut().enumerate() {
            let client = get_server_set(spec, application_name, index)
                .and_then(|(set, _)| set.sso_client.as_ref());
            if let Some(client) = client {
                server.sso_auth_client = client.clone();
                given += 1;
            }
        }
        ensure!(
            given == 0 || given == expected,
            SsoClientCountSnafu { given, expected }
        );
    }

    if let Some(ldap) = &auth.ldap {
        ensure!(!ldap.url.is_empty(), MissingLdapUrlSnafu);
        auth_template.ldap = Some(ldap.clone());
    }

    template.auth = auth_template;
    Ok(())
}

/// A properties file path mounts its directory, a bare file name is placed in the default
/// role mapping directory. A path without extension is taken as the directory itself.
fn role_mapper_template(config: &RoleMapperAuthConfig) -> RoleMapperTemplate {
    let path = Path::new(&config.roles_properties);
    let (roles_properties, mount_path) = if path.extension().is_none() {
        let directory = if config.roles_properties.is_empty() {
            ROLE_MAPPER_DEFAULT_DIR.to_owned()
        } else {
            config.roles_properties.clone()
        };
        (config.roles_properties.clone(), directory)
    } else {
        match path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
            Some(parent) => (
                config.roles_properties.clone(),
                parent.to_string_lossy().into_owned(),
            ),
            None => (
                format!("{ROLE_MAPPER_DEFAULT_DIR}/{}", config.roles_properties),
                ROLE_MAPPER_DEFAULT_DIR.to_owned(),
            ),
        }
    };

    RoleMapperTemplate {
        roles_properties,
        replace_role: config.replace_role,
        mount_path,
        from: config.from.as_ref().map(object_template),
    }
}

/// Points `HOSTNAME_HTTPS` of every SSO client container at `hostname`, the host of the
/// component's route. Values that are already set are kept.
pub fn configure_hostname(object: &mut CustomObject, spec: &KieAppSpec, hostname: &str) {
    if spec.auth.sso.is_none() || hostname.is_empty() {
        return;
    }

    let containers = object
        .deployment_configs
        .iter_mut()
        .filter_map(|dc| dc.spec.template.as_mut())
        .filter_map(|template| template.spec.as_mut())
        .flat_map(|pod| pod.containers.iter_mut());
    for container in containers {
        let Some(env) = container.env.as_mut() else {
            continue;
        };
        if !env.iter().any(|var| var.name == SSO_CLIENT_ENV) {
            continue;
        }
        match env.iter_mut().find(|var| var.name == HOSTNAME_HTTPS_ENV) {
            Some(var) if var.value.as_deref().is_some_and(|value| !value.is_empty()) => {}
            Some(var) => var.value = Some(hostname.to_owned()),
            None => env.push(EnvVar {
                name: HOSTNAME_HTTPS_ENV.to_owned(),
                value: Some(hostname.to_owned()),
                ..EnvVar::default()
            }),
        }
    }
}
