use k8s_openapi::api::{
    batch::v1::{CronJob, CronJobSpec, JobSpec, JobTemplateSpec},
    core::v1::{Container, PodSpec, PodTemplateSpec, SecretVolumeSource, Volume, VolumeMount},
};

use super::ManifestInputs;

const PARAMETERS_VOLUME: &str = "user-params";
const PARAMETERS_MOUNT: &str = "/opt/scripts";

/// The job periodically applying the starburst enterprise manifest from the parameters
pub fn cron_job(inputs: &ManifestInputs<'_>) -> CronJob {
    let config = inputs.config;
    let namespace = &inputs.target_namespace;

    CronJob {
        metadata: meta! {
            owners: inputs.owners_in(namespace),
            name: Some(config.resource_name.clone()),
            namespace: Some(namespace.clone()),
            labels: Some(labels! { part_of: inputs.addon_name })
        },
        spec: Some(CronJobSpec {
            schedule: config.job_schedule.clone(),
            failed_jobs_history_limit: Some(3),
            job_template: JobTemplateSpec {
                metadata: None,
                spec: Some(JobSpec {
                    template: PodTemplateSpec {
                        metadata: None,
                        spec: Some(PodSpec {
                            service_account_name: Some(config.job_service_account.clone()),
                            volumes: Some(vec![Volume {
                                name: PARAMETERS_VOLUME.into(),
                                secret: Some(SecretVolumeSource {
                                    secret_name: Some(config.parameters_secret.clone()),
                                    default_mode: Some(0o755),
                                    ..Default::default()
                                }),
                                ..Default::default()
                            }]),
                            containers: vec![Container {
                                name: "addon".into(),
                                image: Some(config.job_image.clone()),
                                command: Some(vec![
                                    "sh".into(),
                                    "-c".into(),
                                    format!("kubectl apply -f {PARAMETERS_MOUNT}/starburstenterprise.yaml"),
                                ]),
                                volume_mounts: Some(vec![VolumeMount {
                                    name: PARAMETERS_VOLUME.into(),
                                    mount_path: PARAMETERS_MOUNT.into(),
                                    read_only: Some(true),
                                    ..Default::default()
                                }]),
                                ..Default::default()
                            }],
                            restart_policy: Some("Never".into()),
                            ..Default::default()
                        }),
                    },
                    ..Default::default()
                }),
            },
            ..Default::default()
        }),
        status: None,
    }
}
