//! Cyber-observable objects and their predefined extensions.

use super::{embedded, hashes, key_values, sub_object, sub_objects};
use crate::mapping::{DomainTable, ExtensionSpec, KindBuilder, ObjectCategory, RelationKind};
use crate::model::config::OBSERVABLES_DOMAIN;
use crate::model::ImportConfiguration;

fn sco<'d>(t: &'d mut DomainTable, stix_type: &str) -> KindBuilder<'d> {
    t.object(stix_type, stix_type, ObjectCategory::Sco)
        .text("spec_version", "spec-version")
        .flag("defanged", "defanged")
        .relations(&["object_marking_refs", "granular_markings", "extensions"])
}

pub fn domain(_config: &ImportConfiguration) -> DomainTable {
    let mut t = DomainTable::new(OBSERVABLES_DOMAIN);

    // ------------------------------------------------------------------
    // Files and content
    // ------------------------------------------------------------------

    sco(&mut t, "file")
        .texts(&["name", "name_enc", "magic_number_hex", "mime_type"])
        .long("size", "size")
        .timestamps(&["ctime", "mtime", "atime"])
        .relations(&["hashes", "parent_directory_ref", "contains_refs", "content_ref"]);
    sco(&mut t, "directory")
        .texts(&["path", "path_enc"])
        .timestamps(&["ctime", "mtime", "atime"])
        .relations(&["contains_refs"]);
    sco(&mut t, "artifact")
        .texts(&["mime_type", "payload_bin", "url", "encryption_algorithm", "decryption_key"])
        .relations(&["hashes"]);

    t.kind("archive-ext").texts(&["comment"]).relations(&["contains_refs"]);
    t.kind("ntfs-ext").texts(&["sid"]).relations(&["alternate_data_streams"]);
    t.kind("alternate-data-stream")
        .texts(&["name"])
        .long("size", "size")
        .relations(&["hashes"]);
    t.kind("pdf-ext")
        .texts(&["version", "pdfid0", "pdfid1"])
        .boolean("is_optimized", "is-optimized")
        .relations(&["document_info_dict"]);

    // ------------------------------------------------------------------
    // Network
    // ------------------------------------------------------------------

    for addr in ["ipv4-addr", "ipv6-addr"] {
        sco(&mut t, addr)
            .texts(&["value"])
            .relations(&["resolves_to_refs", "belongs_to_refs"]);
    }
    sco(&mut t, "mac-addr").texts(&["value"]);
    sco(&mut t, "domain-name").texts(&["value"]).relations(&["resolves_to_refs"]);
    sco(&mut t, "url").texts(&["value"]);
    sco(&mut t, "autonomous-system")
        .long("number", "number")
        .texts(&["name", "rir"]);
    sco(&mut t, "network-traffic")
        .timestamps(&["start", "end"])
        .boolean("is_active", "is-active")
        .long("src_port", "src-port")
        .long("dst_port", "dst-port")
        .texts(&["protocols"])
        .long("src_byte_count", "src-byte-count")
        .long("dst_byte_count", "dst-byte-count")
        .long("src_packets", "src-packets")
        .long("dst_packets", "dst-packets")
        .relations(&[
            "src_ref",
            "dst_ref",
            "ipfix",
            "src_payload_ref",
            "dst_payload_ref",
            "encapsulates_refs",
            "encapsulated_by_ref",
        ]);
    t.kind("http-request-ext")
        .texts(&["request_method", "request_value", "request_version"])
        .long("message_body_length", "message-body-length")
        .relations(&["request_header", "message_body_data_ref"]);

    // ------------------------------------------------------------------
    // Hosts and accounts
    // ------------------------------------------------------------------

    sco(&mut t, "process")
        .boolean("is_hidden", "is-hidden")
        .long("pid", "pid")
        .timestamps(&["created_time"])
        .texts(&["cwd", "command_line"])
        .relations(&[
            "environment_variables",
            "opened_connection_refs",
            "creator_user_ref",
            "image_ref",
            "parent_ref",
            "child_refs",
        ]);
    t.kind("windows-process-ext")
        .boolean("aslr_enabled", "aslr-enabled")
        .boolean("dep_enabled", "dep-enabled")
        .texts(&["priority", "owner_sid", "window_title", "integrity_level"])
        .relations(&["startup_info"]);
    sco(&mut t, "user-account")
        .texts(&["user_id", "credential", "account_login", "account_type", "display_name"])
        .boolean("is_service_account", "is-service-account")
        .boolean("is_privileged", "is-privileged")
        .boolean("can_escalate_privs", "can-escalate-privs")
        .boolean("is_disabled", "is-disabled")
        .timestamps(&[
            "account_created",
            "account_expires",
            "credential_last_changed",
            "account_first_login",
            "account_last_login",
        ]);
    t.kind("unix-account-ext")
        .long("gid", "gid")
        .texts(&["groups", "home_dir", "shell"]);
    sco(&mut t, "software").texts(&["name", "cpe", "swid", "languages", "vendor", "version"]);
    sco(&mut t, "mutex").texts(&["name"]);
    sco(&mut t, "windows-registry-key")
        .texts(&["key"])
        .timestamps(&["modified_time"])
        .long("number_of_subkeys", "number-of-subkeys")
        .relations(&["values", "creator_user_ref"]);
    t.kind("windows-registry-value").texts(&["name", "data", "data_type"]);
    sco(&mut t, "x509-certificate")
        .boolean("is_self_signed", "is-self-signed")
        .texts(&[
            "version",
            "serial_number",
            "signature_algorithm",
            "issuer",
            "subject",
            "subject_public_key_algorithm",
            "subject_public_key_modulus",
        ])
        .timestamps(&["validity_not_before", "validity_not_after"])
        .long("subject_public_key_exponent", "subject-public-key-exponent")
        .relations(&["hashes"]);

    // ------------------------------------------------------------------
    // Email
    // ------------------------------------------------------------------

    sco(&mut t, "email-addr")
        .texts(&["value", "display_name"])
        .relations(&["belongs_to_ref"]);
    sco(&mut t, "email-message")
        .boolean("is_multipart", "is-multipart")
        .timestamps(&["date"])
        .texts(&["content_type", "message_id", "subject", "received_lines", "body"])
        .relations(&[
            "from_ref",
            "sender_ref",
            "to_refs",
            "cc_refs",
            "bcc_refs",
            "additional_header_fields",
            "body_multipart",
            "raw_email_ref",
        ]);
    t.kind("email-mime-part")
        .texts(&["body", "content_type", "content_disposition"])
        .relations(&["body_raw_ref"]);

    // ------------------------------------------------------------------
    // Extensions
    // ------------------------------------------------------------------

    t.extension("archive-ext", sub_object("archive-extension", "file", "archive", "archive-ext"))
        .extension("ntfs-ext", sub_object("ntfs-extension", "file", "ntfs", "ntfs-ext"))
        .extension("pdf-ext", sub_object("pdf-extension", "file", "pdf", "pdf-ext"))
        .extension(
            "windows-process-ext",
            sub_object("windows-process-extension", "process", "windows-process", "windows-process-ext"),
        )
        .extension("http-request-ext", sub_object("http-request-extension", "traffic", "http-request", "http-request-ext"))
        .extension("unix-account-ext", sub_object("unix-account-extension", "account", "unix-account", "unix-account-ext"));

    // ------------------------------------------------------------------
    // Relation-backed fields
    // ------------------------------------------------------------------

    t.relation("object_marking_refs", embedded("object-marking", "marked", "marking"))
        .relation("extensions", RelationKind::ExtensionObject(ExtensionSpec::default()))
        .relation("hashes", hashes())
        .relation("parent_directory_ref", embedded("parent-directory", "contained-file", "directory"))
        .relation("contains_refs", embedded("contains", "container", "contained"))
        .relation("content_ref", embedded("content", "file", "content"))
        .relation("resolves_to_refs", embedded("resolves-to", "resolving", "resolved"))
        .relation("belongs_to_refs", embedded("belongs-to", "belonging", "owner"))
        .relation("belongs_to_ref", embedded("email-owner", "email", "owner"))
        .relation("src_ref", embedded("traffic-src", "traffic", "source"))
        .relation("dst_ref", embedded("traffic-dst", "traffic", "destination"))
        .relation("src_payload_ref", embedded("src-payload", "traffic", "payload"))
        .relation("dst_payload_ref", embedded("dst-payload", "traffic", "payload"))
        .relation("encapsulates_refs", embedded("encapsulates", "encapsulating", "encapsulated"))
        .relation("encapsulated_by_ref", embedded("encapsulated-by", "encapsulated", "encapsulating"))
        .relation("message_body_data_ref", embedded("message-body-data", "request", "data"))
        .relation("opened_connection_refs", embedded("opened-connection", "opening", "opened"))
        .relation("creator_user_ref", embedded("creator-user", "created", "creator"))
        .relation("image_ref", embedded("process-image", "process", "image"))
        .relation("parent_ref", embedded("parent-process", "child", "parent"))
        .relation("child_refs", embedded("child-process", "parent", "child"))
        .relation("from_ref", embedded("email-from", "email", "from"))
        .relation("sender_ref", embedded("email-sender", "email", "sender"))
        .relation("to_refs", embedded("email-to", "email", "to"))
        .relation("cc_refs", embedded("email-cc", "email", "cc"))
        .relation("bcc_refs", embedded("email-bcc", "email", "bcc"))
        .relation("raw_email_ref", embedded("raw-email", "email", "raw"))
        .relation("body_raw_ref", embedded("body-raw", "mime-part", "raw"))
        .relation(
            "alternate_data_streams",
            sub_objects("alternate-data-streams", "file", "stream", "alternate-data-stream"),
        )
        .relation("body_multipart", sub_objects("body-multipart", "email", "mime-part", "email-mime-part"))
        .relation("values", sub_objects("registry-values", "key", "value", "windows-registry-value"))
        .relation(
            "environment_variables",
            key_values("environment-variables", "process", "variable", "environment-variable"),
        )
        .relation("startup_info", key_values("startup-info", "process", "info", "startup-info-entry"))
        .relation("ipfix", key_values("ipfix", "traffic", "element", "ipfix-entry"))
        .relation("request_header", key_values("request-header", "request", "header", "http-header"))
        .relation(
            "additional_header_fields",
            key_values("additional-header", "email", "header", "email-header"),
        )
        .relation("document_info_dict", key_values("document-info", "pdf", "entry", "document-info-entry"));

    t.multi(&[
        "object_marking_refs",
        "granular_markings",
        "contains_refs",
        "resolves_to_refs",
        "belongs_to_refs",
        "protocols",
        "encapsulates_refs",
        "opened_connection_refs",
        "child_refs",
        "languages",
        "groups",
        "to_refs",
        "cc_refs",
        "bcc_refs",
        "received_lines",
        "body_multipart",
        "values",
        "alternate_data_streams",
    ]);

    t
}
