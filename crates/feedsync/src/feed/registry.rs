//! The closed set of feeds
//!
//! Each entity is a `static` [`FeedDescriptor`]. [`all`] returns them in the
//! order a full run launches them.

use super::descriptor::{
    ColumnDef as C, ColumnKind, FeedDescriptor, FeedSource, MediaRefs, QueryParam as Q, RefreshPolicy,
    ReplacePolicy,
};

pub static INSPECTIONS: FeedDescriptor = FeedDescriptor {
    name: "inspections",
    source: FeedSource::Paginated("feed/inspections"),
    primary_key: &["audit_id"],
    columns: &[
        C::key("audit_id", "id", 100),
        C::text("name", "name"),
        C::boolean("archived", "archived"),
        C::text("owner_name", "owner_name"),
        C::key("owner_id", "owner_id", 37),
        C::text("author_name", "author_name"),
        C::key("author_id", "author_id", 37),
        C::float("score", "score"),
        C::float("max_score", "max_score"),
        C::float("score_percentage", "score_percentage"),
        C::integer("duration", "duration"),
        C::key("template_id", "template_id", 100),
        C::key("organisation_id", "organisation_id", 37),
        C::text("template_name", "template_name"),
        C::text("template_author", "template_author"),
        C::key("site_id", "site_id", 41),
        C::timestamp("date_started", "date_started"),
        C::timestamp("date_completed", "date_completed"),
        C::timestamp("date_modified", "date_modified"),
        C::timestamp("created_at", "created_at"),
        C::timestamp("modified_at", "modified_at"),
        C::exported_at(),
        C::text("document_no", "document_no"),
        C::text("prepared_by", "prepared_by"),
        C::text("location", "location"),
        C::timestamp("conducted_on", "conducted_on"),
        C::text("personnel", "personnel"),
        C::text("client_site", "client_site"),
        C::float("latitude", "latitude"),
        C::float("longitude", "longitude"),
        C::text("web_report_link", "web_report_link"),
        C::boolean("deleted", "deleted"),
    ],
    order: &["modified_at", "audit_id"],
    cursor_column: Some("modified_at"),
    scope_column: Some("organisation_id"),
    refresh: RefreshPolicy::Incremental,
    replace: ReplacePolicy::None,
    params: &[
        Q::ModifiedAfter,
        Q::Templates,
        Q::Archived,
        Q::Completed,
        Q::InspectionLimit,
        Q::WebReportLink,
    ],
    skip_column: Some("audit_id"),
    fan_out: None,
    media: None,
};

pub static INSPECTION_ITEMS: FeedDescriptor = FeedDescriptor {
    name: "inspection_items",
    source: FeedSource::Paginated("feed/inspection_items"),
    primary_key: &["id"],
    columns: &[
        C::key("id", "id", 150),
        C::key("item_id", "item_id", 100),
        C::key("audit_id", "audit_id", 100),
        C::integer("item_index", "item_index"),
        C::key("template_id", "template_id", 100),
        C::key("parent_id", "parent_id", 100),
        C::timestamp("created_at", "created_at"),
        C::timestamp("modified_at", "modified_at"),
        C::exported_at(),
        C::key("type", "type", 20),
        C::text("category", "category"),
        C::key("category_id", "category_id", 100),
        C::key("organisation_id", "organisation_id", 37),
        C::text("parent_ids", "parent_ids"),
        C::text("label", "label"),
        C::text("response", "response"),
        C::key("response_id", "response_id", 100),
        C::key("response_set_id", "response_set_id", 100),
        C::boolean("is_failed_response", "is_failed_response"),
        C::text("comment", "comment"),
        C::text("media_files", "media_files"),
        C::text("media_ids", "media_ids"),
        C::text("media_hypertext_reference", "media_hypertext_reference"),
        C::float("score", "score"),
        C::float("max_score", "max_score"),
        C::float("score_percentage", "score_percentage"),
        C::float("combined_score", "combined_score"),
        C::float("combined_max_score", "combined_max_score"),
        C::float("combined_score_percentage", "combined_score_percentage"),
        C::boolean("mandatory", "mandatory"),
        C::boolean("inactive", "inactive"),
        C::float("location_latitude", "location_latitude"),
        C::float("location_longitude", "location_longitude"),
    ],
    order: &["modified_at", "id"],
    cursor_column: Some("modified_at"),
    scope_column: Some("organisation_id"),
    refresh: RefreshPolicy::Incremental,
    replace: ReplacePolicy::None,
    params: &[
        Q::ModifiedAfter,
        Q::Templates,
        Q::Archived,
        Q::Completed,
        Q::InspectionLimit,
        Q::IncludeInactive,
    ],
    skip_column: Some("audit_id"),
    fan_out: None,
    media: Some(MediaRefs {
        urls: "media_hypertext_reference",
        owner: "audit_id",
    }),
};

pub static TEMPLATES: FeedDescriptor = FeedDescriptor {
    name: "templates",
    source: FeedSource::Paginated("feed/templates"),
    primary_key: &["template_id"],
    columns: &[
        C::key("template_id", "id", 100),
        C::boolean("archived", "archived"),
        C::text("name", "name"),
        C::text("description", "description"),
        C::key("organisation_id", "organisation_id", 37),
        C::text("owner_name", "owner_name"),
        C::key("owner_id", "owner_id", 37),
        C::text("author_name", "author_name"),
        C::key("author_id", "author_id", 37),
        C::timestamp("created_at", "created_at"),
        C::timestamp("modified_at", "modified_at"),
        C::exported_at(),
    ],
    order: &["modified_at", "template_id"],
    cursor_column: Some("modified_at"),
    scope_column: Some("organisation_id"),
    refresh: RefreshPolicy::Incremental,
    replace: ReplacePolicy::None,
    params: &[Q::ModifiedAfter],
    skip_column: None,
    fan_out: None,
    media: None,
};

pub static TEMPLATE_PERMISSIONS: FeedDescriptor = FeedDescriptor {
    name: "template_permissions",
    source: FeedSource::Paginated("feed/template_permissions"),
    primary_key: &["permission_id"],
    columns: &[
        C::key("permission_id", "id", 375),
        C::key("template_id", "template_id", 100),
        C::key("permission", "permission", 10),
        C::key("assignee_id", "assignee_id", 256),
        C::key("assignee_type", "assignee_type", 10),
        C::key("organisation_id", "organisation_id", 37),
        C::exported_at(),
    ],
    order: &["permission_id"],
    cursor_column: None,
    scope_column: Some("organisation_id"),
    refresh: RefreshPolicy::Truncate,
    replace: ReplacePolicy::None,
    params: &[],
    skip_column: None,
    fan_out: None,
    media: None,
};

pub static SITES: FeedDescriptor = FeedDescriptor {
    name: "sites",
    source: FeedSource::Paginated("feed/sites"),
    primary_key: &["site_id"],
    columns: &[
        C::key("site_id", "id", 41),
        C::text("name", "name"),
        C::key("creator_id", "creator_id", 37),
        C::key("organisation_id", "organisation_id", 37),
        C::exported_at(),
        C::boolean("deleted", "deleted"),
        C::key("site_uuid", "site_uuid", 36),
        C::key("meta_label", "meta_label", 36),
        C::key("parent_id", "parent_id", 41),
    ],
    order: &["site_id"],
    cursor_column: None,
    scope_column: Some("organisation_id"),
    refresh: RefreshPolicy::Upsert,
    replace: ReplacePolicy::None,
    params: &[Q::IncludeDeleted, Q::ShowOnlyLeafNodes],
    skip_column: None,
    fan_out: None,
    media: None,
};

pub static SITE_MEMBERS: FeedDescriptor = FeedDescriptor {
    name: "site_members",
    source: FeedSource::Paginated("feed/site_members"),
    primary_key: &["site_id", "member_id"],
    columns: &[
        C::key("site_id", "site_id", 41),
        C::key("member_id", "member_id", 37),
        C::exported_at(),
    ],
    order: &["site_id", "member_id"],
    cursor_column: None,
    scope_column: None,
    refresh: RefreshPolicy::Upsert,
    replace: ReplacePolicy::None,
    params: &[],
    skip_column: None,
    fan_out: None,
    media: None,
};

pub static USERS: FeedDescriptor = FeedDescriptor {
    name: "users",
    source: FeedSource::Paginated("feed/users"),
    primary_key: &["user_id"],
    columns: &[
        C::key("user_id", "id", 37),
        C::key("organisation_id", "organisation_id", 37),
        C::key("email", "email", 256),
        C::text("firstname", "firstname"),
        C::text("lastname", "lastname"),
        C::boolean("active", "active"),
        C::timestamp("last_seen_at", "last_seen_at"),
        C::exported_at(),
    ],
    order: &["user_id"],
    cursor_column: None,
    scope_column: Some("organisation_id"),
    refresh: RefreshPolicy::Upsert,
    replace: ReplacePolicy::None,
    params: &[],
    skip_column: None,
    fan_out: None,
    media: None,
};

pub static GROUPS: FeedDescriptor = FeedDescriptor {
    name: "groups",
    source: FeedSource::Paginated("feed/groups"),
    primary_key: &["group_id"],
    columns: &[
        C::key("group_id", "id", 37),
        C::text("name", "name"),
        C::key("organisation_id", "organisation_id", 37),
        C::exported_at(),
    ],
    order: &["group_id"],
    cursor_column: None,
    scope_column: Some("organisation_id"),
    refresh: RefreshPolicy::Upsert,
    replace: ReplacePolicy::None,
    params: &[],
    skip_column: None,
    fan_out: None,
    media: None,
};

pub static GROUP_USERS: FeedDescriptor = FeedDescriptor {
    name: "group_users",
    source: FeedSource::Paginated("feed/group_users"),
    primary_key: &["user_id", "group_id"],
    columns: &[
        C::key("user_id", "user_id", 37),
        C::key("group_id", "group_id", 37),
        C::key("organisation_id", "organisation_id", 37),
        C::exported_at(),
    ],
    order: &["group_id", "user_id"],
    cursor_column: None,
    scope_column: Some("organisation_id"),
    refresh: RefreshPolicy::Upsert,
    replace: ReplacePolicy::Scope,
    params: &[],
    skip_column: None,
    fan_out: None,
    media: None,
};

pub static SCHEDULES: FeedDescriptor = FeedDescriptor {
    name: "schedules",
    source: FeedSource::Paginated("feed/schedules"),
    primary_key: &["schedule_id"],
    columns: &[
        C::key("schedule_id", "id", 45),
        C::text("description", "description"),
        C::key("recurrence", "recurrence", 100),
        C::key("duration", "duration", 50),
        C::timestamp("modified_at", "modified_at"),
        C::exported_at(),
        C::timestamp("from_date", "from_date"),
        C::timestamp("to_date", "to_date"),
        C::integer("start_time_hour", "start_time_hour"),
        C::integer("start_time_minute", "start_time_minute"),
        C::boolean("all_must_complete", "all_must_complete"),
        C::key("status", "status", 10),
        C::key("organisation_id", "organisation_id", 37),
        C::text("timezone", "timezone"),
        C::boolean("can_late_submit", "can_late_submit"),
        C::key("site_id", "site_id", 41),
        C::key("template_id", "template_id", 100),
        C::key("creator_user_id", "creator_user_id", 37),
    ],
    order: &["schedule_id"],
    cursor_column: None,
    scope_column: Some("organisation_id"),
    refresh: RefreshPolicy::Upsert,
    replace: ReplacePolicy::None,
    params: &[Q::Templates],
    skip_column: None,
    fan_out: None,
    media: None,
};

pub static SCHEDULE_ASSIGNEES: FeedDescriptor = FeedDescriptor {
    name: "schedule_assignees",
    source: FeedSource::Paginated("feed/schedule_assignees"),
    primary_key: &["id"],
    columns: &[
        C::key("id", "id", 100),
        C::key("schedule_id", "schedule_id", 45),
        C::key("assignee_id", "assignee_id", 37),
        C::key("organisation_id", "organisation_id", 37),
        C::key("type", "type", 10),
        C::text("name", "name"),
        C::exported_at(),
    ],
    order: &["schedule_id", "assignee_id"],
    cursor_column: None,
    scope_column: Some("organisation_id"),
    refresh: RefreshPolicy::Truncate,
    replace: ReplacePolicy::None,
    params: &[Q::Templates],
    skip_column: None,
    fan_out: None,
    media: None,
};

pub static SCHEDULE_OCCURRENCES: FeedDescriptor = FeedDescriptor {
    name: "schedule_occurrences",
    source: FeedSource::Paginated("feed/schedule_occurrences"),
    primary_key: &["id"],
    columns: &[
        C::key("id", "id", 128),
        C::key("schedule_id", "schedule_id", 45),
        C::key("occurrence_id", "occurrence_id", 30),
        C::key("template_id", "template_id", 100),
        C::key("organisation_id", "organisation_id", 37),
        C::timestamp("start_time", "start_time"),
        C::timestamp("due_time", "due_time"),
        C::timestamp("miss_time", "miss_time"),
        C::key("occurrence_status", "occurrence_status", 20),
        C::key("audit_id", "audit_id", 100),
        C::timestamp("completed_at", "completed_at"),
        C::exported_at(),
        C::key("user_id", "user_id", 37),
        C::key("assignee_status", "assignee_status", 20),
    ],
    order: &["occurrence_id", "schedule_id"],
    cursor_column: None,
    scope_column: Some("organisation_id"),
    refresh: RefreshPolicy::Upsert,
    replace: ReplacePolicy::None,
    params: &[Q::Templates],
    skip_column: None,
    fan_out: None,
    media: None,
};

pub static ACTIONS: FeedDescriptor = FeedDescriptor {
    name: "actions",
    source: FeedSource::Paginated("feed/actions"),
    primary_key: &["action_id"],
    columns: &[
        C::key("action_id", "id", 36),
        C::text("title", "title"),
        C::text("description", "description"),
        C::key("site_id", "site_id", 41),
        C::key("priority", "priority", 20),
        C::key("status", "status", 20),
        C::timestamp("due_date", "due_date"),
        C::timestamp("created_at", "created_at"),
        C::timestamp("modified_at", "modified_at"),
        C::exported_at(),
        C::key("creator_user_id", "creator_user_id", 37),
        C::text("creator_user_name", "creator_user_name"),
        C::key("template_id", "template_id", 100),
        C::key("audit_id", "audit_id", 100),
        C::text("audit_title", "audit_title"),
        C::key("audit_item_id", "audit_item_id", 100),
        C::text("audit_item_label", "audit_item_label"),
        C::key("organisation_id", "organisation_id", 37),
        C::timestamp("completed_at", "completed_at"),
    ],
    order: &["action_id"],
    cursor_column: Some("modified_at"),
    scope_column: Some("organisation_id"),
    refresh: RefreshPolicy::Incremental,
    replace: ReplacePolicy::None,
    params: &[Q::ModifiedAfter, Q::ActionLimit],
    skip_column: None,
    fan_out: None,
    media: None,
};

pub static ACTION_ASSIGNEES: FeedDescriptor = FeedDescriptor {
    name: "action_assignees",
    source: FeedSource::Paginated("feed/action_assignees"),
    primary_key: &["id"],
    columns: &[
        C::key("id", "id", 375),
        C::key("action_id", "action_id", 36),
        C::key("assignee_id", "assignee_id", 256),
        C::key("type", "type", 10),
        C::text("name", "name"),
        C::key("organisation_id", "organisation_id", 37),
        C::timestamp("modified_at", "modified_at"),
        C::exported_at(),
    ],
    order: &["action_id", "assignee_id"],
    cursor_column: Some("modified_at"),
    scope_column: Some("organisation_id"),
    refresh: RefreshPolicy::Incremental,
    replace: ReplacePolicy::Parent("action_id"),
    params: &[Q::ModifiedAfter],
    skip_column: None,
    fan_out: None,
    media: None,
};

pub static ISSUES: FeedDescriptor = FeedDescriptor {
    name: "issues",
    source: FeedSource::Paginated("feed/issues"),
    primary_key: &["id"],
    columns: &[
        C::key("id", "id", 36),
        C::text("title", "title"),
        C::text("description", "description"),
        C::text("creator_id", "creator_id"),
        C::text("creator_user_name", "creator_user_name"),
        C::timestamp("created_at", "created_at"),
        C::timestamp("due_at", "due_at"),
        C::text("priority", "priority"),
        C::text("status", "status"),
        C::text("template_id", "template_id"),
        C::text("inspection_id", "inspection_id"),
        C::text("inspection_name", "inspection_name"),
        C::text("site_id", "site_id"),
        C::text("site_name", "site_name"),
        C::text("location_name", "location_name"),
        C::text("category_id", "category_id"),
        C::text("category_label", "category_label"),
        C::timestamp("modified_at", "modified_at"),
        C::timestamp("completed_at", "completed_at"),
        C::exported_at(),
    ],
    order: &["id"],
    cursor_column: None,
    scope_column: None,
    refresh: RefreshPolicy::Truncate,
    replace: ReplacePolicy::None,
    params: &[Q::IssueLimit],
    skip_column: None,
    fan_out: None,
    media: None,
};

pub static ASSETS: FeedDescriptor = FeedDescriptor {
    name: "assets",
    source: FeedSource::Paginated("feed/assets"),
    primary_key: &["asset_id"],
    columns: &[
        C::key("asset_id", "id", 36),
        C::text("code", "code"),
        C::text("type_id", "type_id"),
        C::text("type_name", "type_name"),
        C::text("fields", "fields"),
        C::timestamp("created_at", "created_at"),
        C::timestamp("modified_at", "modified_at"),
        C::key("site_id", "site_id", 41),
        C::text("state", "state"),
        C::exported_at(),
    ],
    order: &["asset_id"],
    cursor_column: None,
    scope_column: None,
    refresh: RefreshPolicy::Truncate,
    replace: ReplacePolicy::None,
    params: &[Q::AssetLimit],
    skip_column: None,
    fan_out: None,
    media: None,
};

pub static SHEQSY_EMPLOYEES: FeedDescriptor = FeedDescriptor {
    name: "sheqsy_employees",
    source: FeedSource::Sheqsy("employees"),
    primary_key: &["employee_uid"],
    columns: &[
        C::key("employee_uid", "employeeUId", 32),
        C::integer("employee_id", "employeeId"),
        C::text("external_id", "externalId"),
        C::text("first_name", "firstName"),
        C::text("last_name", "lastName"),
        C::text("email", "email"),
        C::integer("accepted_activities_count", "acceptedActivitiesCount"),
        C::integer("pending_activities_count", "pendingActivitiesCount"),
        C::boolean("is_in_panic", "isInPanic"),
        C::text("status", "status"),
        C::text("last_activity_date_time_utc", "lastActivityDateTimeUTC"),
        C::name_list("departments", "departments"),
        C::exported_at(),
    ],
    order: &["employee_uid"],
    cursor_column: None,
    scope_column: None,
    refresh: RefreshPolicy::Upsert,
    replace: ReplacePolicy::None,
    params: &[],
    skip_column: None,
    fan_out: None,
    media: None,
};

pub static SHEQSY_DEPARTMENTS: FeedDescriptor = FeedDescriptor {
    name: "sheqsy_departments",
    source: FeedSource::Sheqsy("departments"),
    primary_key: &["department_uid"],
    columns: &[
        C::key("department_uid", "departmentUId", 32),
        C::integer("department_id", "departmentId"),
        C::text("name", "name"),
        C::text("external_name", "external_name"),
        C::text("number", "number"),
        C::text("manager", "manager"),
        C::exported_at(),
    ],
    order: &["department_uid"],
    cursor_column: None,
    scope_column: None,
    refresh: RefreshPolicy::Upsert,
    replace: ReplacePolicy::None,
    params: &[],
    skip_column: None,
    fan_out: None,
    media: None,
};

pub static SHEQSY_DEPARTMENT_EMPLOYEES: FeedDescriptor = FeedDescriptor {
    name: "sheqsy_department_employees",
    source: FeedSource::Sheqsy("employees"),
    primary_key: &["employee_uid", "department_uid"],
    columns: &[
        C::key("employee_uid", "employeeUId", 32),
        C::item("department_uid", "departmentUId", ColumnKind::Text, Some(32)),
        C::integer("employee_id", "employeeId"),
        C::item("department_id", "departmentId", ColumnKind::Integer, None),
        C::exported_at(),
    ],
    order: &["employee_uid", "department_uid"],
    cursor_column: None,
    scope_column: None,
    refresh: RefreshPolicy::Upsert,
    replace: ReplacePolicy::None,
    params: &[],
    skip_column: None,
    fan_out: Some("departments"),
    media: None,
};

pub static SHEQSY_SHIFTS: FeedDescriptor = FeedDescriptor {
    name: "sheqsy_shifts",
    source: FeedSource::SheqsyHistory("shifts/history"),
    primary_key: &["shift_id"],
    columns: &[
        C::integer("shift_id", "shiftId"),
        C::text("employee_name", "employeeName"),
        C::text("employee_surname", "employeeSurname"),
        C::text("email", "email"),
        C::text("phone_number", "phoneNumber"),
        C::timestamp("start_date_time_utc", "startDateTimeUTC"),
        C::timestamp("finish_date_time_utc", "finishDateTimeUTC"),
        C::text("last_reported_address", "lastReportedAddress"),
        C::float("last_reported_latitude", "lastReportedLatitude"),
        C::float("last_reported_longitude", "lastReportedLongitude"),
        C::integer("version", "version"),
        C::string_list("departments", "departments"),
        C::exported_at(),
    ],
    order: &["shift_id"],
    cursor_column: None,
    scope_column: None,
    refresh: RefreshPolicy::Upsert,
    replace: ReplacePolicy::None,
    params: &[],
    skip_column: None,
    fan_out: None,
    media: None,
};

pub static SHEQSY_ACTIVITIES: FeedDescriptor = FeedDescriptor {
    name: "sheqsy_activities",
    source: FeedSource::SheqsyHistory("activities/history"),
    primary_key: &["activity_uid"],
    columns: &[
        C::key("activity_uid", "activityUId", 32),
        C::integer("activity_id", "activityId"),
        C::text("external_id", "externalId"),
        C::text("email", "email"),
        C::text("phone_number", "phoneNumber"),
        C::text("activity_name", "activityName"),
        C::timestamp("start_date_time_utc", "startDateTimeUTC"),
        C::timestamp("finish_date_time_utc", "finishDateTimeUTC"),
        C::text("activity_type", "activityType"),
        C::text("employee_name", "employeeName"),
        C::text("employee_surname", "employeeSurname"),
        C::float("start_latitude", "startLatitude"),
        C::float("start_longitude", "startLongitude"),
        C::text("start_address", "startAddress"),
        C::float("finish_latitude", "finishLatitude"),
        C::float("finish_longitude", "finishLongitude"),
        C::text("finish_address", "finishAddress"),
        C::integer("time_spent_sec", "timeSpentSec"),
        C::integer("version", "version"),
        C::integer("time_enroute_sec", "timeEnrouteSec"),
        C::integer("distance_travelled_meters", "distanceTravelledMeters"),
        C::integer("shift_id", "shiftId"),
        C::string_list("departments", "departments"),
        C::exported_at(),
    ],
    order: &["activity_uid"],
    cursor_column: None,
    scope_column: None,
    refresh: RefreshPolicy::Upsert,
    replace: ReplacePolicy::None,
    params: &[],
    skip_column: None,
    fan_out: None,
    media: None,
};

static ALL: [&FeedDescriptor; 21] = [
    &INSPECTIONS,
    &INSPECTION_ITEMS,
    &TEMPLATES,
    &TEMPLATE_PERMISSIONS,
    &SITES,
    &SITE_MEMBERS,
    &USERS,
    &GROUPS,
    &GROUP_USERS,
    &SCHEDULES,
    &SCHEDULE_ASSIGNEES,
    &SCHEDULE_OCCURRENCES,
    &ACTIONS,
    &ACTION_ASSIGNEES,
    &ISSUES,
    &ASSETS,
    &SHEQSY_EMPLOYEES,
    &SHEQSY_DEPARTMENTS,
    &SHEQSY_DEPARTMENT_EMPLOYEES,
    &SHEQSY_SHIFTS,
    &SHEQSY_ACTIVITIES,
];

/// Every feed in launch order
pub fn all() -> &'static [&'static FeedDescriptor] {
    &ALL
}

pub fn by_name(name: &str) -> Option<&'static FeedDescriptor> {
    ALL.iter().copied().find(|feed| feed.name == name)
}

/// Feeds named in `tables`, in launch order. An empty list selects every feed;
/// unknown names are ignored.
pub fn select(tables: &[String]) -> Vec<&'static FeedDescriptor> {
    if tables.is_empty() {
        return ALL.to_vec();
    }
    ALL.iter()
        .copied()
        .filter(|feed| tables.iter().any(|t| t.trim() == feed.name))
        .collect()
}
